//! Error taxonomy for the prediction pipeline
//!
//! Per-call failures (schema, shape, input, backend) are recovered at the
//! inference entrypoint by emitting the fallback parameters. Artifact errors
//! surface from adapter construction and abort the process.

use std::path::PathBuf;

/// Errors produced by the encoder, decoder, model adapters and entrypoint
#[derive(Debug, thiserror::Error)]
pub enum PredictorError {
    /// A statistics value is present but cannot be coerced to its slot type
    #[error("invalid statistics record: {0}")]
    Schema(#[source] serde_json::Error),

    /// Feature vector length does not match the adapter's input dimension
    #[error("feature vector has {actual} dimensions, {backend} backend expects {expected}")]
    Shape {
        backend: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Raw model output does not have one value per parameter
    #[error("expected {expected} raw outputs, got {actual}")]
    Output { expected: usize, actual: usize },

    /// Model artifact is missing, unreadable or internally inconsistent
    #[error("model artifact {}: {reason}", path.display())]
    Artifact { path: PathBuf, reason: String },

    /// Input file could not be read
    #[error("failed to read input {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tabular input row is malformed
    #[error("table row {row}: {reason}")]
    Table { row: usize, reason: String },

    /// Backend failed while evaluating a well-formed input
    #[error("{backend} inference failed: {reason}")]
    Backend {
        backend: &'static str,
        reason: String,
    },
}

impl PredictorError {
    pub(crate) fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Artifact {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error indicates a broken deployment rather than bad input
    pub fn is_artifact_error(&self) -> bool {
        matches!(self, Self::Artifact { .. })
    }
}

pub type Result<T, E = PredictorError> = std::result::Result<T, E>;
