//! Core data models for the parameter predictor

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Summary statistics describing one data block, as written by the
/// compression engine. Every field is optional; absent and `null` both
/// resolve to zero during encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRecord {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    pub variance: Option<f64>,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub range: Option<f64>,
    pub iqr: Option<f64>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_count")]
    pub unique_count: Option<i64>,
    pub unique_ratio: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub zero_count: Option<i64>,
    pub zero_ratio: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub integer_count: Option<i64>,
    pub integer_ratio: Option<f64>,

    pub diff_stats: Option<DifferenceStats>,
    pub second_diff_stats: Option<DifferenceStats>,

    pub monotonicity: Option<f64>,
    pub smoothness: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub change_points: Option<i64>,

    pub run_length: Option<RunLengthStats>,
    pub bit_stats: Option<BitLevelStats>,

    pub entropy: Option<f64>,
    pub percentile_95: Option<f64>,
    pub percentile_5: Option<f64>,

    pub auto_correlation: Option<Vec<f64>>,

    #[serde(default, deserialize_with = "deserialize_count")]
    pub periodicity: Option<i64>,
    pub periodic_score: Option<f64>,
}

/// First or second order difference statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DifferenceStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub range: Option<f64>,
    pub zero_ratio: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub unique_count: Option<i64>,
    pub unique_ratio: Option<f64>,
}

/// Run-length statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLengthStats {
    #[serde(default, deserialize_with = "deserialize_count")]
    pub max_run_length: Option<i64>,
    pub avg_run_length: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub run_count: Option<i64>,
    pub constant_run_ratio: Option<f64>,
}

/// Bit-level statistics of the IEEE-754 representation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BitLevelStats {
    pub avg_set_bits: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub sign_changes: Option<i64>,
    pub mantissa_entropy: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub exponent_range: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub common_exponent: Option<i64>,
}

/// Accepts JSON integers and integral floats (`100.0`); `null` is absent.
fn deserialize_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    let Some(number) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Some(i) = number.as_i64() {
        return Ok(Some(i));
    }
    match number.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            Ok(Some(f as i64))
        }
        _ => Err(SerdeError::custom(format!(
            "expected an integer count, got {number}"
        ))),
    }
}

/// Fixed-order flattened encoding of a [`StatisticsRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Output schema of the deployed model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterSet {
    /// Three outputs `[del, ranged, algo]`
    Legacy,
    /// Four outputs `[ranged, scale, del, algo]`
    #[default]
    Full,
}

impl ParameterSet {
    /// Parameter names in output order
    pub fn names(&self) -> &'static [&'static str] {
        match self {
            ParameterSet::Legacy => &["del", "ranged", "algo"],
            ParameterSet::Full => &["ranged", "scale", "del", "algo"],
        }
    }

    /// Inclusive legal range of each parameter, in output order
    pub fn bounds(&self) -> &'static [(u8, u8)] {
        match self {
            ParameterSet::Legacy => &[(0, 2), (0, 1), (0, 1)],
            ParameterSet::Full => &[(0, 2), (0, 2), (0, 2), (0, 4)],
        }
    }

    pub fn arity(&self) -> usize {
        self.names().len()
    }

    /// Values emitted when an invocation fails
    pub fn fallback(&self) -> Vec<u8> {
        vec![0; self.arity()]
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterSet::Legacy => f.write_str("legacy"),
            ParameterSet::Full => f.write_str("full"),
        }
    }
}

impl FromStr for ParameterSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(ParameterSet::Legacy),
            "full" => Ok(ParameterSet::Full),
            other => Err(format!(
                "unknown parameter set '{other}' (expected 'full' or 'legacy')"
            )),
        }
    }
}

/// Compression parameter selection `[ranged, scale, del, algo]`
///
/// Only constructible with every component inside its legal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterVector {
    ranged: u8,
    scale: u8,
    del: u8,
    algo: u8,
}

impl ParameterVector {
    pub const RANGED_MAX: u8 = 2;
    pub const SCALE_MAX: u8 = 2;
    pub const DEL_MAX: u8 = 2;
    pub const ALGO_MAX: u8 = 4;

    /// Returns `None` if any component is out of range
    pub fn new(ranged: u8, scale: u8, del: u8, algo: u8) -> Option<Self> {
        (ranged <= Self::RANGED_MAX
            && scale <= Self::SCALE_MAX
            && del <= Self::DEL_MAX
            && algo <= Self::ALGO_MAX)
            .then_some(Self {
                ranged,
                scale,
                del,
                algo,
            })
    }

    pub fn ranged(&self) -> u8 {
        self.ranged
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn del(&self) -> u8 {
        self.del
    }

    pub fn algo(&self) -> u8 {
        self.algo
    }

    pub fn to_array(&self) -> [u8; 4] {
        [self.ranged, self.scale, self.del, self.algo]
    }
}

/// Three-parameter selection `[del, ranged, algo]` of the legacy deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LegacyParameterVector {
    del: u8,
    ranged: u8,
    algo: u8,
}

impl LegacyParameterVector {
    pub const DEL_MAX: u8 = 2;
    pub const RANGED_MAX: u8 = 1;
    pub const ALGO_MAX: u8 = 1;

    pub fn new(del: u8, ranged: u8, algo: u8) -> Option<Self> {
        (del <= Self::DEL_MAX && ranged <= Self::RANGED_MAX && algo <= Self::ALGO_MAX)
            .then_some(Self { del, ranged, algo })
    }

    pub fn del(&self) -> u8 {
        self.del
    }

    pub fn ranged(&self) -> u8 {
        self.ranged
    }

    pub fn algo(&self) -> u8 {
        self.algo
    }

    pub fn to_array(&self) -> [u8; 3] {
        [self.del, self.ranged, self.algo]
    }
}

/// Decoded parameters for either output schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedParameters {
    Full(ParameterVector),
    Legacy(LegacyParameterVector),
}

impl DecodedParameters {
    pub fn values(&self) -> Vec<u8> {
        match self {
            DecodedParameters::Full(p) => p.to_array().to_vec(),
            DecodedParameters::Legacy(p) => p.to_array().to_vec(),
        }
    }

    pub fn parameter_set(&self) -> ParameterSet {
        match self {
            DecodedParameters::Full(_) => ParameterSet::Full,
            DecodedParameters::Legacy(_) => ParameterSet::Legacy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_accept_integral_floats() {
        let record: StatisticsRecord =
            serde_json::from_str(r#"{"unique_count": 100.0, "zero_count": 3}"#).unwrap();
        assert_eq!(record.unique_count, Some(100));
        assert_eq!(record.zero_count, Some(3));
    }

    #[test]
    fn test_counts_reject_fractions_and_strings() {
        assert!(serde_json::from_str::<StatisticsRecord>(r#"{"unique_count": 1.5}"#).is_err());
        assert!(serde_json::from_str::<StatisticsRecord>(r#"{"change_points": "5"}"#).is_err());
    }

    #[test]
    fn test_null_and_absent_are_equivalent() {
        let absent: StatisticsRecord = serde_json::from_str("{}").unwrap();
        let null: StatisticsRecord = serde_json::from_str(
            r#"{"min": null, "periodicity": null, "diff_stats": null, "auto_correlation": null}"#,
        )
        .unwrap();
        assert_eq!(absent, null);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let record: StatisticsRecord = serde_json::from_str(
            r#"{"run_length": {"max_run_length": 4, "InRunRatio": 0.25}, "extra": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(record.run_length.unwrap().max_run_length, Some(4));
    }

    #[test]
    fn test_parameter_vector_rejects_out_of_range() {
        assert!(ParameterVector::new(2, 2, 2, 4).is_some());
        assert!(ParameterVector::new(3, 0, 0, 0).is_none());
        assert!(ParameterVector::new(0, 0, 0, 5).is_none());
        assert!(LegacyParameterVector::new(2, 1, 1).is_some());
        assert!(LegacyParameterVector::new(0, 2, 0).is_none());
    }

    #[test]
    fn test_parameter_set_shape() {
        assert_eq!(ParameterSet::Full.arity(), 4);
        assert_eq!(ParameterSet::Legacy.arity(), 3);
        assert_eq!(ParameterSet::Full.fallback(), vec![0, 0, 0, 0]);
        assert_eq!(ParameterSet::Legacy.fallback(), vec![0, 0, 0]);
        assert_eq!(ParameterSet::Full.bounds().len(), ParameterSet::Full.arity());
        assert_eq!("LEGACY".parse::<ParameterSet>(), Ok(ParameterSet::Legacy));
        assert!("three".parse::<ParameterSet>().is_err());
    }
}
