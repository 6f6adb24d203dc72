//! `encode` subcommand: export a statistics record as a training-set row

use anyhow::{Context, Result};
use clap::Args;
use predictor_lib::predictor::{feature_names, FeatureEncoder, BASE_DIMENSION};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Args)]
pub struct EncodeArgs {
    /// Statistics JSON file
    #[arg(long, short = 's')]
    pub stats: PathBuf,

    /// Emit a header line of feature names (only into new or empty files with --out)
    #[arg(long)]
    pub header: bool,

    /// Append the row to this CSV file instead of printing it
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Six decimal places, matching the training export
fn format_row(values: &[f64]) -> Vec<String> {
    values.iter().map(|v| format!("{v:.6}")).collect()
}

fn header_for(dimensions: usize) -> Vec<String> {
    feature_names(dimensions.saturating_sub(BASE_DIMENSION))
}

fn write_rows<W: Write>(writer: W, header: Option<&[String]>, row: &[String]) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    if let Some(names) = header {
        writer.write_record(names)?;
    }
    writer.write_record(row)?;
    writer.flush()?;
    Ok(())
}

pub fn run(args: &EncodeArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.stats)
        .with_context(|| format!("Failed to read {}", args.stats.display()))?;
    let features = FeatureEncoder::new()
        .encode_json(&text)
        .with_context(|| format!("Failed to encode {}", args.stats.display()))?;
    debug!(dimensions = features.len(), "Statistics encoded");

    let row = format_row(features.as_slice());
    let header = header_for(features.len());
    match &args.out {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let empty = file.metadata().map(|m| m.len() == 0).unwrap_or(false);
            let header = (args.header && empty).then_some(header.as_slice());
            write_rows(file, header, &row)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => {
            let header = args.header.then_some(header.as_slice());
            write_rows(std::io::stdout().lock(), header, &row)
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_formatting() {
        assert_eq!(format_row(&[1.0, 0.5, -2.25]), ["1.000000", "0.500000", "-2.250000"]);
        assert_eq!(format_row(&[1.0 / 3.0]), ["0.333333"]);
    }

    #[test]
    fn test_header_width_follows_lags() {
        assert_eq!(header_for(61).len(), 61);
        assert_eq!(header_for(51).len(), 51);
        assert_eq!(&header_for(61)[..3], ["min", "max", "mean"]);
    }

    #[test]
    fn test_rows_written_as_csv() {
        let mut out = Vec::new();
        let header = vec!["min".to_string(), "max".to_string()];
        write_rows(&mut out, Some(header.as_slice()), &format_row(&[1.0, 2.5])).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "min,max\n1.000000,2.500000\n");

        let mut out = Vec::new();
        write_rows(&mut out, None, &format_row(&[-0.125])).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "-0.125000\n");
    }
}
