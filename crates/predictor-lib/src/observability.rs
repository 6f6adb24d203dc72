//! Structured logging for prediction events
//!
//! Every event carries an `event` field so JSON log consumers can filter
//! without parsing messages. Output goes wherever the binary's subscriber
//! points, which is stderr; stdout is reserved for the emitted parameters.

use tracing::{debug, info, warn};

/// Class probability below which a classifier output is flagged
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Structured logger for predictor events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    backend: String,
}

impl StructuredLogger {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Log process startup
    pub fn log_startup(&self, version: &str, parameter_set: &str, model_dir: &str) {
        info!(
            event = "predictor_started",
            backend = %self.backend,
            version = %version,
            parameter_set = %parameter_set,
            model_dir = %model_dir,
            "Parameter predictor started"
        );
    }

    /// Log a successfully constructed adapter
    pub fn log_artifacts_loaded(&self, input_dim: usize, output_dim: usize, elapsed_ms: u128) {
        info!(
            event = "artifacts_loaded",
            backend = %self.backend,
            input_dim = input_dim,
            output_dim = output_dim,
            elapsed_ms = elapsed_ms as u64,
            "Model artifacts loaded"
        );
    }

    pub fn log_encoded(&self, dimensions: usize) {
        debug!(
            event = "features_encoded",
            backend = %self.backend,
            dimensions = dimensions,
            "Statistics encoded"
        );
    }

    /// Log the decoded parameters of the first row
    pub fn log_prediction(&self, values: &[u8], rows: usize, elapsed_us: u128) {
        info!(
            event = "prediction_generated",
            backend = %self.backend,
            parameters = ?values,
            rows = rows,
            elapsed_us = elapsed_us as u64,
            "Generated compression parameters"
        );
    }

    /// Log the mean class probability behind one classifier output
    pub fn log_confidence(&self, output: usize, label: f64, confidence: f64) {
        debug!(
            event = "prediction_confidence",
            backend = %self.backend,
            output = output,
            label = label,
            confidence = confidence,
            low_confidence = confidence < LOW_CONFIDENCE_THRESHOLD,
            "Classifier confidence"
        );
    }

    /// Log a per-call failure that was replaced by the fallback parameters
    pub fn log_fallback(&self, stage: &str, reason: &str, fallback: &[u8]) {
        warn!(
            event = "prediction_fallback",
            backend = %self.backend,
            stage = %stage,
            reason = %reason,
            parameters = ?fallback,
            "Prediction failed, emitting fallback parameters"
        );
    }
}
