//! Declared inference inputs
//!
//! The caller states what kind of file it hands over; content is never
//! sniffed. A statistics file holds one JSON object, a table holds
//! headerless CSV rows of already encoded features.

use crate::error::{PredictorError, Result};
use crate::models::{FeatureVector, StatisticsRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// One JSON statistics record
    Statistics,
    /// Pre-encoded feature rows
    Table,
}

impl InputKind {
    /// `.json` files are statistics records, anything else a table
    pub fn from_extension(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => InputKind::Statistics,
            _ => InputKind::Table,
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Statistics => f.write_str("statistics"),
            InputKind::Table => f.write_str("table"),
        }
    }
}

impl FromStr for InputKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "statistics" | "stats" | "json" => Ok(InputKind::Statistics),
            "table" | "csv" => Ok(InputKind::Table),
            other => Err(format!("unknown input kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
enum Source {
    File(PathBuf),
    Text(String),
}

/// Input handed to the inference entrypoint
#[derive(Debug, Clone)]
pub struct InferenceInput {
    kind: InputKind,
    source: Source,
}

/// Input after the parse stage
#[derive(Debug, Clone)]
pub enum ParsedInput {
    Record(StatisticsRecord),
    Rows(Vec<FeatureVector>),
}

impl InferenceInput {
    pub fn from_path(kind: InputKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            source: Source::File(path.into()),
        }
    }

    pub fn from_text(kind: InputKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            source: Source::Text(text.into()),
        }
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    /// Path of a file-backed input
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::File(path) => Some(path),
            Source::Text(_) => None,
        }
    }

    fn read(&self) -> Result<String> {
        match &self.source {
            Source::File(path) => {
                std::fs::read_to_string(path).map_err(|source| PredictorError::Input {
                    path: path.clone(),
                    source,
                })
            }
            Source::Text(text) => Ok(text.clone()),
        }
    }

    /// Read and parse according to the declared kind
    pub fn parse(&self) -> Result<ParsedInput> {
        let text = self.read()?;
        match self.kind {
            InputKind::Statistics => serde_json::from_str(&text)
                .map(ParsedInput::Record)
                .map_err(PredictorError::Schema),
            InputKind::Table => parse_table(&text).map(ParsedInput::Rows),
        }
    }
}

/// Parse headerless comma-separated float rows; blank lines are skipped.
///
/// Cells may be quoted and padded with whitespace. Reported row numbers are
/// 1-based line numbers in the source text.
pub fn parse_table(text: &str) -> Result<Vec<FeatureVector>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| PredictorError::Table {
            row: e.position().map_or(0, |p| p.line() as usize),
            reason: format!("failed to read row: {e}"),
        })?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let row = record.position().map_or(rows.len() + 1, |p| p.line() as usize);
        let values = record
            .iter()
            .map(|cell| {
                cell.parse::<f64>().map_err(|_| PredictorError::Table {
                    row,
                    reason: format!("'{cell}' is not a number"),
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(FeatureVector::from(values));
    }
    if rows.is_empty() {
        return Err(PredictorError::Table {
            row: 0,
            reason: "table has no rows".to_string(),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_table_skips_blank_lines() {
        let rows = parse_table("1.0, 2.5,3\n\n   \n-4,5e-1,0\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].as_slice(), &[1.0, 2.5, 3.0]);
        assert_eq!(rows[1].as_slice(), &[-4.0, 0.5, 0.0]);
    }

    #[test]
    fn test_empty_table_is_error() {
        assert!(matches!(
            parse_table("\n\n"),
            Err(PredictorError::Table { row: 0, .. })
        ));
    }

    #[test]
    fn test_bad_cell_reports_row() {
        let err = parse_table("1,2\n3,abc\n").unwrap_err();
        assert!(matches!(err, PredictorError::Table { row: 2, .. }));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_bad_cell_row_counts_blank_lines() {
        let err = parse_table("1,2\n\n3,x\n").unwrap_err();
        assert!(matches!(err, PredictorError::Table { row: 3, .. }));
    }

    #[test]
    fn test_quoted_cells_accepted() {
        let rows = parse_table("\"1.0\",\"2.0\"\n\" 3 \",4\n").unwrap();
        assert_eq!(rows[0].as_slice(), &[1.0, 2.0]);
        assert_eq!(rows[1].as_slice(), &[3.0, 4.0]);
    }

    #[test]
    fn test_byte_order_mark_ignored() {
        let rows = parse_table("\u{feff}1.0,2.0\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn test_crlf_rows() {
        let rows = parse_table("1,2\r\n3,4\r\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].as_slice(), &[3.0, 4.0]);
    }

    #[test]
    fn test_header_row_rejected() {
        assert!(parse_table("min,max\n1,2\n").is_err());
    }

    #[test]
    fn test_statistics_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"min": 1.0, "run_length": {{"InRunRatio": 0.3}}}}"#).unwrap();
        let input = InferenceInput::from_path(InputKind::Statistics, file.path());
        match input.parse().unwrap() {
            ParsedInput::Record(record) => {
                assert_eq!(record.min, Some(1.0));
                assert!(record.run_length.is_some());
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_input_error() {
        let input = InferenceInput::from_path(InputKind::Table, "/nonexistent/rows.csv");
        assert!(matches!(input.parse(), Err(PredictorError::Input { .. })));
    }

    #[test]
    fn test_kind_is_declared_not_sniffed() {
        // a JSON document declared as a table is a table parse failure
        let input = InferenceInput::from_text(InputKind::Table, r#"{"min": 1}"#);
        assert!(matches!(input.parse(), Err(PredictorError::Table { .. })));
    }

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(
            InputKind::from_extension(Path::new("stats.JSON")),
            InputKind::Statistics
        );
        assert_eq!(InputKind::from_extension(Path::new("rows.csv")), InputKind::Table);
        assert_eq!(InputKind::from_extension(Path::new("rows")), InputKind::Table);
    }
}
