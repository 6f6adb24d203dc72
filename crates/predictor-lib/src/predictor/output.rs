//! Prediction output decoding
//!
//! Converts raw model outputs into legal compression parameters. Each value
//! is rounded half-to-even and then clamped into its parameter's range, so
//! an out-of-range prediction is corrected rather than reported.

use crate::error::{PredictorError, Result};
use crate::models::{DecodedParameters, LegacyParameterVector, ParameterSet, ParameterVector};

/// Round half to even, then clamp into `[lo, hi]`.
///
/// `NaN` and `-inf` map to `lo`, `+inf` maps to `hi`.
pub fn round_and_clamp(raw: f64, lo: u8, hi: u8) -> u8 {
    if raw.is_nan() {
        return lo;
    }
    let rounded = raw.round_ties_even();
    if rounded <= lo as f64 {
        lo
    } else if rounded >= hi as f64 {
        hi
    } else {
        rounded as u8
    }
}

/// Decode four raw predictions `[ranged, scale, del, algo]`
pub fn decode(raw: [f64; 4]) -> ParameterVector {
    let [ranged, scale, del, algo] = raw;
    let vector = ParameterVector::new(
        round_and_clamp(ranged, 0, ParameterVector::RANGED_MAX),
        round_and_clamp(scale, 0, ParameterVector::SCALE_MAX),
        round_and_clamp(del, 0, ParameterVector::DEL_MAX),
        round_and_clamp(algo, 0, ParameterVector::ALGO_MAX),
    );
    // clamping keeps every component inside its range
    vector.unwrap_or_else(|| unreachable!("clamped parameters out of range"))
}

/// Decode three raw predictions `[del, ranged, algo]`
pub fn decode_legacy(raw: [f64; 3]) -> LegacyParameterVector {
    let [del, ranged, algo] = raw;
    LegacyParameterVector::new(
        round_and_clamp(del, 0, LegacyParameterVector::DEL_MAX),
        round_and_clamp(ranged, 0, LegacyParameterVector::RANGED_MAX),
        round_and_clamp(algo, 0, LegacyParameterVector::ALGO_MAX),
    )
    .unwrap_or_else(|| unreachable!("clamped parameters out of range"))
}

/// Decodes raw outputs for a configured [`ParameterSet`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterDecoder {
    parameter_set: ParameterSet,
}

impl ParameterDecoder {
    pub fn new(parameter_set: ParameterSet) -> Self {
        Self { parameter_set }
    }

    pub fn parameter_set(&self) -> ParameterSet {
        self.parameter_set
    }

    /// Decode raw outputs; fails only when the output count is wrong
    pub fn decode(&self, raw: &[f64]) -> Result<DecodedParameters> {
        let expected = self.parameter_set.arity();
        let wrong_len = || PredictorError::Output {
            expected,
            actual: raw.len(),
        };
        match self.parameter_set {
            ParameterSet::Full => {
                let raw: [f64; 4] = raw.try_into().map_err(|_| wrong_len())?;
                Ok(DecodedParameters::Full(decode(raw)))
            }
            ParameterSet::Legacy => {
                let raw: [f64; 3] = raw.try_into().map_err(|_| wrong_len())?;
                Ok(DecodedParameters::Legacy(decode_legacy(raw)))
            }
        }
    }
}
