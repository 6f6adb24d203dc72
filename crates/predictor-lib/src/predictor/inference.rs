//! ONNX inference using tract
//!
//! Runs the feed-forward network exported to ONNX. Inputs are standardized
//! with the training scaler, cast to `f32` and fed as a `[1, n]` tensor.

use super::network::Standardizer;
use super::Predictor;
use crate::error::{PredictorError, Result};
use std::path::Path;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Inference latency above which a warning is logged
const SLOW_INFERENCE_MS: u128 = 50;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-based predictor using tract
pub struct OnnxPredictor {
    model: TractModel,
    scaler: Standardizer,
    output_dim: usize,
}

impl std::fmt::Debug for OnnxPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxPredictor")
            .field("input_dim", &self.scaler.dim())
            .field("output_dim", &self.output_dim)
            .finish()
    }
}

impl OnnxPredictor {
    /// Load the scaler and an ONNX model whose single input is `[1, scaler dim]`
    pub fn load(model_path: &Path, scaler_path: &Path) -> Result<Self> {
        let scaler = Standardizer::load(scaler_path)?;
        let model = Self::load_model(model_path, scaler.dim())
            .map_err(|e| PredictorError::artifact(model_path, format!("{e:#}")))?;

        // a zero vector measures the output width and proves the graph runs
        let baseline = run_model(&model, &vec![0.0; scaler.dim()])
            .map_err(|e| PredictorError::artifact(model_path, format!("{e:#}")))?;
        if baseline.is_empty() {
            return Err(PredictorError::artifact(model_path, "model produced no outputs"));
        }
        debug!(
            path = %model_path.display(),
            input_dim = scaler.dim(),
            output_dim = baseline.len(),
            "ONNX model loaded"
        );
        Ok(Self {
            model,
            scaler,
            output_dim: baseline.len(),
        })
    }

    /// Load and optimize an ONNX model from disk
    fn load_model(path: &Path, input_dim: usize) -> TractResult<TractModel> {
        tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(0, f32::fact([1, input_dim]).into())?
            .into_optimized()?
            .into_runnable()
    }
}

fn run_model(model: &TractModel, features: &[f64]) -> TractResult<Vec<f64>> {
    let data: Vec<f32> = features.iter().map(|v| *v as f32).collect();
    let input = Tensor::from_shape(&[1, data.len()], &data)?;
    let result = model.run(tvec!(input.into()))?;
    let output = result
        .first()
        .ok_or_else(|| anyhow::anyhow!("model returned no output tensor"))?;
    let view = output.to_array_view::<f32>()?;
    Ok(view.iter().map(|v| *v as f64).collect())
}

impl Predictor for OnnxPredictor {
    fn backend(&self) -> &'static str {
        "onnx"
    }

    fn input_dim(&self) -> usize {
        self.scaler.dim()
    }

    fn output_dim(&self) -> usize {
        self.output_dim
    }

    fn evaluate(&self, features: &[f64]) -> Result<Vec<f64>> {
        let start = Instant::now();
        let scaled = self.scaler.transform(features);
        let raw = run_model(&self.model, &scaled).map_err(|e| PredictorError::Backend {
            backend: "onnx",
            reason: format!("{e:#}"),
        })?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms", SLOW_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }
        Ok(raw)
    }
}
