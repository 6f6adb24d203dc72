//! Predictor configuration
//!
//! Sources, lowest precedence first: serde defaults, an optional config
//! file, `PARAM_PREDICTOR_*` environment variables. Command-line flags are
//! applied on top by the caller.

use anyhow::{Context, Result};
use predictor_lib::{BackendKind, ParameterSet};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "PARAM_PREDICTOR";

/// Log line format on stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Compact,
}

/// Predictor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PredictorConfig {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub parameter_set: ParameterSet,

    /// Artifact directory; `<executable dir>/models` when unset
    #[serde(default)]
    pub model_dir: Option<PathBuf>,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            parameter_set: ParameterSet::default(),
            model_dir: None,
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}

impl PredictorConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration value")
    }
}
