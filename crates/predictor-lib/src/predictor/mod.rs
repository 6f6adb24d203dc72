//! ML prediction engine

mod artifacts;
mod boosted;
mod features;
mod forest;
mod inference;
mod network;
mod output;


pub use artifacts::{ArtifactLocator, ArtifactOverrides, DEFAULT_MODEL_SUBDIR};
pub use boosted::{BoostedPredictor, XgbRegressor};
pub use features::{
    encode, feature_names, FeatureEncoder, FeatureGroup, AUTOCORRELATION_LAGS, BASE_DIMENSION,
    FEATURE_DIMENSION,
};
pub use forest::{ClassVote, ForestPredictor, Preprocessing};
pub use inference::OnnxPredictor;
pub use network::{NetworkPredictor, Standardizer};
pub use output::{decode, decode_legacy, round_and_clamp, ParameterDecoder};

use crate::error::{PredictorError, Result};
use crate::models::{FeatureVector, ParameterSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trait for prediction backends
///
/// Implementations own their loaded artifact and are read-only after
/// construction, so one instance can serve concurrent callers.
pub trait Predictor: Send + Sync {
    /// Short backend identifier used in logs and errors
    fn backend(&self) -> &'static str;

    /// Feature vector length the artifact was fitted on
    fn input_dim(&self) -> usize;

    /// Number of raw values produced per prediction
    fn output_dim(&self) -> usize;

    /// Backend-specific evaluation of a vector of the right length
    fn evaluate(&self, features: &[f64]) -> Result<Vec<f64>>;

    /// Generate raw parameter predictions from features
    fn predict(&self, features: &FeatureVector) -> Result<Vec<f64>> {
        if features.len() != self.input_dim() {
            return Err(PredictorError::Shape {
                backend: self.backend(),
                expected: self.input_dim(),
                actual: features.len(),
            });
        }
        let raw = self.evaluate(features.as_slice())?;
        if raw.len() != self.output_dim() {
            return Err(PredictorError::Output {
                expected: self.output_dim(),
                actual: raw.len(),
            });
        }
        Ok(raw)
    }
}

/// Available prediction backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Random-forest classifiers, one per parameter, in a single artifact
    Forest,
    /// Gradient-boosted regressors, one XGBoost model per parameter
    #[default]
    #[serde(alias = "xgboost")]
    Boosted,
    /// Feed-forward network evaluated natively from exported weights
    Network,
    /// Feed-forward network exported to ONNX and run with tract
    Onnx,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Forest => "forest",
            BackendKind::Boosted => "boosted",
            BackendKind::Network => "network",
            BackendKind::Onnx => "onnx",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forest" => Ok(BackendKind::Forest),
            "boosted" | "xgboost" => Ok(BackendKind::Boosted),
            "network" => Ok(BackendKind::Network),
            "onnx" => Ok(BackendKind::Onnx),
            other => Err(format!(
                "unknown backend '{other}' (expected forest, boosted, network or onnx)"
            )),
        }
    }
}

/// Load the configured backend's artifacts.
///
/// Every artifact is read here; a missing or corrupt file is reported now
/// rather than on the first prediction.
pub fn create_predictor(
    kind: BackendKind,
    parameter_set: ParameterSet,
    locator: &ArtifactLocator,
) -> Result<Box<dyn Predictor>> {
    let predictor: Box<dyn Predictor> = match kind {
        BackendKind::Forest => {
            let path = locator.forest_model();
            tracing::info!(path = %path.display(), "Loading random forest artifact");
            Box::new(ForestPredictor::load(&path)?)
        }
        BackendKind::Boosted => {
            let paths = locator.boosted_models(parameter_set)?;
            tracing::info!(models = paths.len(), "Loading gradient-boosted regressors");
            Box::new(BoostedPredictor::load(&paths)?)
        }
        BackendKind::Network => {
            let model = locator.network_model();
            let scaler = locator.scaler();
            tracing::info!(
                model = %model.display(),
                scaler = %scaler.display(),
                "Loading network weights"
            );
            Box::new(NetworkPredictor::load(&model, &scaler)?)
        }
        BackendKind::Onnx => {
            let model = locator.onnx_model();
            let scaler = locator.scaler();
            tracing::info!(
                model = %model.display(),
                scaler = %scaler.display(),
                "Loading ONNX network"
            );
            Box::new(OnnxPredictor::load(&model, &scaler)?)
        }
    };
    Ok(predictor)
}
