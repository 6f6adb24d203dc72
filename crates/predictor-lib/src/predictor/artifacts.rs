//! Model artifact path resolution
//!
//! Artifacts live in a `models/` directory next to the installed binary
//! unless a directory or individual files are given explicitly.

use crate::error::{PredictorError, Result};
use crate::models::ParameterSet;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Directory, relative to the executable, searched by default
pub const DEFAULT_MODEL_SUBDIR: &str = "models";

const FOREST_MODEL: &str = "forest_model.json";
const NETWORK_MODEL: &str = "neural_network_model.json";
const ONNX_MODEL: &str = "neural_network_model.onnx";
const NETWORK_SCALER: &str = "neural_network_scaler.json";

/// Explicit artifact files that take precedence over the model directory
#[derive(Debug, Clone, Default)]
pub struct ArtifactOverrides {
    /// Primary model file(s); boosted backends take one per parameter in order
    pub models: Vec<PathBuf>,
    /// Standardization parameters for the network backends
    pub scaler: Option<PathBuf>,
}

/// Resolves artifact paths for each backend
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    dir: PathBuf,
    overrides: ArtifactOverrides,
}

impl ArtifactLocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            overrides: ArtifactOverrides::default(),
        }
    }

    /// Locator rooted at `<executable dir>/models`
    pub fn installed() -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|e| PredictorError::artifact(DEFAULT_MODEL_SUBDIR, e))?;
        let base = exe.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self::new(base.join(DEFAULT_MODEL_SUBDIR)))
    }

    pub fn with_overrides(mut self, overrides: ArtifactOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn primary_or(&self, default_name: &str) -> PathBuf {
        self.overrides
            .models
            .first()
            .cloned()
            .unwrap_or_else(|| self.dir.join(default_name))
    }

    pub fn forest_model(&self) -> PathBuf {
        self.primary_or(FOREST_MODEL)
    }

    pub fn network_model(&self) -> PathBuf {
        self.primary_or(NETWORK_MODEL)
    }

    pub fn onnx_model(&self) -> PathBuf {
        self.primary_or(ONNX_MODEL)
    }

    pub fn scaler(&self) -> PathBuf {
        self.overrides
            .scaler
            .clone()
            .unwrap_or_else(|| self.dir.join(NETWORK_SCALER))
    }

    /// One XGBoost model per parameter, named `xgboost_model_<name>.json`
    pub fn boosted_models(&self, parameter_set: ParameterSet) -> Result<Vec<PathBuf>> {
        if self.overrides.models.is_empty() {
            return Ok(parameter_set
                .names()
                .iter()
                .map(|name| self.dir.join(format!("xgboost_model_{name}.json")))
                .collect());
        }
        if self.overrides.models.len() != parameter_set.arity() {
            return Err(PredictorError::artifact(
                &self.overrides.models[0],
                format!(
                    "{} model files given, the {} parameter set needs one per parameter ({})",
                    self.overrides.models.len(),
                    parameter_set,
                    parameter_set.names().join(", ")
                ),
            ));
        }
        Ok(self.overrides.models.clone())
    }
}

/// Read and parse a JSON artifact, mapping every failure to an artifact error
pub(crate) fn read_json_artifact<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).map_err(|e| PredictorError::artifact(path, e))?;
    serde_json::from_str(&content).map_err(|e| PredictorError::artifact(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let locator = ArtifactLocator::new("/opt/predictor/models");
        assert_eq!(
            locator.forest_model(),
            PathBuf::from("/opt/predictor/models/forest_model.json")
        );
        assert_eq!(
            locator.scaler(),
            PathBuf::from("/opt/predictor/models/neural_network_scaler.json")
        );
        let boosted = locator.boosted_models(ParameterSet::Full).unwrap();
        assert_eq!(
            boosted,
            vec![
                PathBuf::from("/opt/predictor/models/xgboost_model_ranged.json"),
                PathBuf::from("/opt/predictor/models/xgboost_model_scale.json"),
                PathBuf::from("/opt/predictor/models/xgboost_model_del.json"),
                PathBuf::from("/opt/predictor/models/xgboost_model_algo.json"),
            ]
        );
    }

    #[test]
    fn test_overrides_take_precedence() {
        let locator = ArtifactLocator::new("/models").with_overrides(ArtifactOverrides {
            models: vec![PathBuf::from("/tmp/custom.onnx")],
            scaler: Some(PathBuf::from("/tmp/scaler.json")),
        });
        assert_eq!(locator.onnx_model(), PathBuf::from("/tmp/custom.onnx"));
        assert_eq!(locator.scaler(), PathBuf::from("/tmp/scaler.json"));
    }

    #[test]
    fn test_boosted_override_count_must_match() {
        let locator = ArtifactLocator::new("/models").with_overrides(ArtifactOverrides {
            models: vec![PathBuf::from("a.json"), PathBuf::from("b.json")],
            scaler: None,
        });
        let err = locator.boosted_models(ParameterSet::Full).unwrap_err();
        assert!(err.is_artifact_error());
    }

    #[test]
    fn test_installed_dir_is_models() {
        let locator = ArtifactLocator::installed().unwrap();
        assert!(locator.dir().ends_with(DEFAULT_MODEL_SUBDIR));
    }
}
