//! Feature encoding for ML inference
//!
//! Flattens a [`StatisticsRecord`] into the fixed-order vector that every
//! trained artifact was fitted on. The slot order is shared with the
//! statistics producer and must never change: descriptive (12),
//! cardinality (6), first differences (8), second differences (8),
//! temporal (3), run length (4), bit level (5), distribution (3),
//! auto-correlation (variable), periodicity (2).

use crate::error::{PredictorError, Result};
use crate::models::{
    BitLevelStats, DifferenceStats, FeatureVector, RunLengthStats, StatisticsRecord,
};

/// Number of slots excluding the auto-correlation segment
pub const BASE_DIMENSION: usize = 51;

/// Auto-correlation lags written by the statistics producer
pub const AUTOCORRELATION_LAGS: usize = 10;

/// Vector length for a record carrying the usual ten lags
pub const FEATURE_DIMENSION: usize = BASE_DIMENSION + AUTOCORRELATION_LAGS;

/// A nested statistics group that is encoded all-or-nothing.
///
/// An absent group contributes `WIDTH` zeros; a present group writes exactly
/// `WIDTH` values with each field defaulted independently.
pub trait FeatureGroup {
    const WIDTH: usize;
    const NAMES: &'static [&'static str];

    fn write(&self, out: &mut Vec<f64>);
}

impl FeatureGroup for DifferenceStats {
    const WIDTH: usize = 8;
    const NAMES: &'static [&'static str] = &[
        "min",
        "max",
        "mean",
        "std_dev",
        "range",
        "zero_ratio",
        "unique_count",
        "unique_ratio",
    ];

    fn write(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&[
            float(self.min),
            float(self.max),
            float(self.mean),
            float(self.std_dev),
            float(self.range),
            float(self.zero_ratio),
            count(self.unique_count),
            float(self.unique_ratio),
        ]);
    }
}

impl FeatureGroup for RunLengthStats {
    const WIDTH: usize = 4;
    const NAMES: &'static [&'static str] = &[
        "max_run_length",
        "avg_run_length",
        "run_count",
        "constant_run_ratio",
    ];

    fn write(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&[
            count(self.max_run_length),
            float(self.avg_run_length),
            count(self.run_count),
            float(self.constant_run_ratio),
        ]);
    }
}

impl FeatureGroup for BitLevelStats {
    const WIDTH: usize = 5;
    const NAMES: &'static [&'static str] = &[
        "avg_set_bits",
        "sign_changes",
        "mantissa_entropy",
        "exponent_range",
        "common_exponent",
    ];

    fn write(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&[
            float(self.avg_set_bits),
            count(self.sign_changes),
            float(self.mantissa_entropy),
            count(self.exponent_range),
            count(self.common_exponent),
        ]);
    }
}

fn float(value: Option<f64>) -> f64 {
    value.unwrap_or(0.0)
}

fn count(value: Option<i64>) -> f64 {
    value.unwrap_or(0) as f64
}

fn push_group<G: FeatureGroup>(out: &mut Vec<f64>, group: Option<&G>) {
    match group {
        Some(g) => {
            let before = out.len();
            g.write(out);
            debug_assert_eq!(out.len() - before, G::WIDTH);
        }
        None => out.resize(out.len() + G::WIDTH, 0.0),
    }
}

/// Stateless encoder from statistics records to feature vectors
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEncoder;

impl FeatureEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a record into its fixed-order feature vector
    pub fn encode(&self, s: &StatisticsRecord) -> FeatureVector {
        let lags = s.auto_correlation.as_deref().unwrap_or(&[]);
        let mut v = Vec::with_capacity(BASE_DIMENSION + lags.len());

        v.extend_from_slice(&[
            float(s.min),
            float(s.max),
            float(s.mean),
            float(s.median),
            float(s.std_dev),
            float(s.variance),
            float(s.skewness),
            float(s.kurtosis),
            float(s.range),
            float(s.iqr),
            float(s.q1),
            float(s.q3),
        ]);

        v.extend_from_slice(&[
            count(s.unique_count),
            float(s.unique_ratio),
            count(s.zero_count),
            float(s.zero_ratio),
            count(s.integer_count),
            float(s.integer_ratio),
        ]);

        push_group(&mut v, s.diff_stats.as_ref());
        push_group(&mut v, s.second_diff_stats.as_ref());

        v.extend_from_slice(&[
            float(s.monotonicity),
            float(s.smoothness),
            count(s.change_points),
        ]);

        push_group(&mut v, s.run_length.as_ref());
        push_group(&mut v, s.bit_stats.as_ref());

        v.extend_from_slice(&[
            float(s.entropy),
            float(s.percentile_95),
            float(s.percentile_5),
        ]);

        v.extend_from_slice(lags);

        v.extend_from_slice(&[count(s.periodicity), float(s.periodic_score)]);

        FeatureVector::from(v)
    }

    /// Parse a JSON statistics object and encode it
    pub fn encode_json(&self, json: &str) -> Result<FeatureVector> {
        let record: StatisticsRecord =
            serde_json::from_str(json).map_err(PredictorError::Schema)?;
        Ok(self.encode(&record))
    }
}

/// Encode a record with the default encoder
pub fn encode(stats: &StatisticsRecord) -> FeatureVector {
    FeatureEncoder.encode(stats)
}

/// Dotted slot names in vector order for a record with `lags` auto-correlation values
pub fn feature_names(lags: usize) -> Vec<String> {
    const DESCRIPTIVE: &[&str] = &[
        "min", "max", "mean", "median", "std_dev", "variance", "skewness", "kurtosis", "range",
        "iqr", "q1", "q3",
    ];
    const CARDINALITY: &[&str] = &[
        "unique_count",
        "unique_ratio",
        "zero_count",
        "zero_ratio",
        "integer_count",
        "integer_ratio",
    ];
    const TEMPORAL: &[&str] = &["monotonicity", "smoothness", "change_points"];
    const DISTRIBUTION: &[&str] = &["entropy", "percentile_95", "percentile_5"];
    const PERIODICITY: &[&str] = &["periodicity", "periodic_score"];

    fn nested<'a>(prefix: &'a str, names: &'a [&'a str]) -> impl Iterator<Item = String> + 'a {
        names.iter().map(move |n| format!("{prefix}.{n}"))
    }
    fn plain<'a>(names: &'a [&'a str]) -> impl Iterator<Item = String> + 'a {
        names.iter().map(|n| n.to_string())
    }

    let mut names = Vec::with_capacity(BASE_DIMENSION + lags);
    names.extend(plain(DESCRIPTIVE));
    names.extend(plain(CARDINALITY));
    names.extend(nested("diff_stats", DifferenceStats::NAMES));
    names.extend(nested("second_diff_stats", DifferenceStats::NAMES));
    names.extend(plain(TEMPORAL));
    names.extend(nested("run_length", RunLengthStats::NAMES));
    names.extend(nested("bit_stats", BitLevelStats::NAMES));
    names.extend(plain(DISTRIBUTION));
    names.extend((0..lags).map(|i| format!("auto_correlation.{i}")));
    names.extend(plain(PERIODICITY));
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference record used when validating the producer/consumer contract
    const FIXTURE: &str = r#"{
        "min": 1.0, "max": 100.0, "mean": 50.0, "median": 50.0,
        "std_dev": 10.0, "variance": 100.0, "skewness": 0.0, "kurtosis": 0.0,
        "range": 99.0, "iqr": 20.0, "q1": 40.0, "q3": 60.0,
        "unique_count": 100, "unique_ratio": 1.0,
        "zero_count": 0, "zero_ratio": 0.0,
        "integer_count": 100, "integer_ratio": 1.0,
        "diff_stats": {
            "min": -10.0, "max": 10.0, "mean": 0.0,
            "std_dev": 5.0, "range": 20.0,
            "zero_ratio": 0.1, "unique_count": 50, "unique_ratio": 0.5
        },
        "second_diff_stats": {
            "min": -5.0, "max": 5.0, "mean": 0.0,
            "std_dev": 2.0, "range": 10.0,
            "zero_ratio": 0.2, "unique_count": 30, "unique_ratio": 0.3
        },
        "monotonicity": 0.8, "smoothness": 2.0, "change_points": 5,
        "run_length": {
            "max_run_length": 3, "avg_run_length": 1.5,
            "run_count": 50, "constant_run_ratio": 0.1
        },
        "bit_stats": {
            "avg_set_bits": 30.0, "sign_changes": 10,
            "mantissa_entropy": 10.0, "exponent_range": 5,
            "common_exponent": 10
        },
        "entropy": 0.9, "percentile_95": 95.0, "percentile_5": 5.0,
        "auto_correlation": [0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2, 0.1, 0.0],
        "periodicity": 0, "periodic_score": 0.0
    }"#;

    #[test]
    fn test_fixture_full_vector() {
        let v = FeatureEncoder::new().encode_json(FIXTURE).unwrap();
        let expected = vec![
            1.0, 100.0, 50.0, 50.0, 10.0, 100.0, 0.0, 0.0, 99.0, 20.0, 40.0, 60.0, // descriptive
            100.0, 1.0, 0.0, 0.0, 100.0, 1.0, // cardinality
            -10.0, 10.0, 0.0, 5.0, 20.0, 0.1, 50.0, 0.5, // diff
            -5.0, 5.0, 0.0, 2.0, 10.0, 0.2, 30.0, 0.3, // second diff
            0.8, 2.0, 5.0, // temporal
            3.0, 1.5, 50.0, 0.1, // run length
            30.0, 10.0, 10.0, 5.0, 10.0, // bits
            0.9, 95.0, 5.0, // distribution
            0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2, 0.1, 0.0, // auto-correlation
            0.0, 0.0, // periodicity
        ];
        assert_eq!(v.len(), FEATURE_DIMENSION);
        assert_eq!(v.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_fixture_descriptive_prefix() {
        let v = FeatureEncoder::new().encode_json(FIXTURE).unwrap();
        assert_eq!(
            &v.as_slice()[..12],
            &[1.0, 100.0, 50.0, 50.0, 10.0, 100.0, 0.0, 0.0, 99.0, 20.0, 40.0, 60.0]
        );
    }

    #[test]
    fn test_empty_record_is_all_zero() {
        let v = FeatureEncoder::new().encode_json("{}").unwrap();
        assert_eq!(v.len(), BASE_DIMENSION);
        assert!(v.as_slice().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_absent_group_slots_are_zero() {
        let mut record: StatisticsRecord = serde_json::from_str(FIXTURE).unwrap();
        record.diff_stats = None;
        record.bit_stats = None;
        let v = encode(&record);
        assert_eq!(v.len(), FEATURE_DIMENSION);
        assert!(v.as_slice()[18..26].iter().all(|x| *x == 0.0));
        assert!(v.as_slice()[41..46].iter().all(|x| *x == 0.0));
        // neighbouring groups untouched
        assert_eq!(v.as_slice()[26], -5.0);
        assert_eq!(v.as_slice()[46], 0.9);
    }

    #[test]
    fn test_present_group_defaults_fields_independently() {
        let v = FeatureEncoder::new()
            .encode_json(r#"{"run_length": {"run_count": 7}}"#)
            .unwrap();
        assert_eq!(&v.as_slice()[37..41], &[0.0, 0.0, 7.0, 0.0]);
    }

    #[test]
    fn test_explicit_zero_preserved_and_null_defaults() {
        let v = FeatureEncoder::new()
            .encode_json(r#"{"min": 0.0, "max": null, "mean": -3.5}"#)
            .unwrap();
        assert_eq!(&v.as_slice()[..3], &[0.0, 0.0, -3.5]);
    }

    #[test]
    fn test_key_order_irrelevant() {
        let a = FeatureEncoder::new()
            .encode_json(r#"{"min": 1.0, "max": 2.0, "bit_stats": {"sign_changes": 4, "avg_set_bits": 3.0}}"#)
            .unwrap();
        let b = FeatureEncoder::new()
            .encode_json(r#"{"bit_stats": {"avg_set_bits": 3.0, "sign_changes": 4}, "max": 2.0, "min": 1.0}"#)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let record: StatisticsRecord = serde_json::from_str(FIXTURE).unwrap();
        let a = encode(&record);
        let b = encode(&record);
        let bits = |v: &FeatureVector| v.as_slice().iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn test_auto_correlation_length_drives_dimension() {
        let v = FeatureEncoder::new()
            .encode_json(r#"{"auto_correlation": [0.5, 0.25, 0.125], "periodicity": 12}"#)
            .unwrap();
        assert_eq!(v.len(), BASE_DIMENSION + 3);
        assert_eq!(&v.as_slice()[49..], &[0.5, 0.25, 0.125, 12.0, 0.0]);
    }

    #[test]
    fn test_string_in_numeric_field_is_schema_error() {
        let err = FeatureEncoder::new()
            .encode_json(r#"{"mean": "fifty"}"#)
            .unwrap_err();
        assert!(matches!(err, PredictorError::Schema(_)));
    }

    #[test]
    fn test_feature_names_match_layout() {
        let names = feature_names(AUTOCORRELATION_LAGS);
        assert_eq!(names.len(), FEATURE_DIMENSION);
        assert_eq!(names[0], "min");
        assert_eq!(names[18], "diff_stats.min");
        assert_eq!(names[26], "second_diff_stats.min");
        assert_eq!(names[37], "run_length.max_run_length");
        assert_eq!(names[41], "bit_stats.avg_set_bits");
        assert_eq!(names[49], "auto_correlation.0");
        assert_eq!(names[60], "periodic_score");
    }
}
