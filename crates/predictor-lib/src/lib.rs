//! Compression parameter prediction library
//!
//! This crate provides:
//! - Feature encoding of block statistics into a fixed-order vector
//! - Model adapters for the trained backends (forest, boosted, network, ONNX)
//! - Decoding of raw model outputs into legal parameter tuples
//! - The inference entrypoint with its fallback guarantee

pub mod error;
pub mod input;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod predictor;

pub use error::{PredictorError, Result};
pub use input::{InferenceInput, InputKind};
pub use models::*;
pub use observability::StructuredLogger;
pub use pipeline::{Emission, InferenceEntrypoint, Stage, StageError};
pub use predictor::{create_predictor, ArtifactLocator, ArtifactOverrides, BackendKind, Predictor};
