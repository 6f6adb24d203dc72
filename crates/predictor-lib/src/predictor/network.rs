//! Feed-forward network backend
//!
//! Evaluates the exported weights of a network built from stacked
//! `linear -> batch norm -> relu` blocks and a linear head. Batch-norm
//! running statistics are frozen and folded into a per-unit scale and shift
//! at load time; dropout does not exist at inference.

use super::artifacts::read_json_artifact;
use super::Predictor;
use crate::error::{PredictorError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Per-dimension standardization fitted at training time
#[derive(Debug, Clone, Deserialize)]
pub struct Standardizer {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Standardizer {
    pub fn load(path: &Path) -> Result<Self> {
        let scaler: Standardizer = read_json_artifact(path)?;
        if scaler.mean.is_empty() {
            return Err(PredictorError::artifact(path, "scaler has no dimensions"));
        }
        scaler
            .validate(scaler.mean.len())
            .map_err(|reason| PredictorError::artifact(path, reason))?;
        Ok(scaler)
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub(crate) fn validate(&self, dim: usize) -> std::result::Result<(), String> {
        if self.mean.len() != dim || self.scale.len() != dim {
            return Err(format!(
                "scaler has {} means and {} scales, expected {dim} of each",
                self.mean.len(),
                self.scale.len()
            ));
        }
        if self.scale.iter().any(|s| !s.is_finite()) {
            return Err("scaler contains a non-finite scale".to_string());
        }
        Ok(())
    }

    /// `(x - mean) / scale`; a zero scale (constant training column) divides by one
    pub fn transform(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| {
                let s = if *s == 0.0 { 1.0 } else { *s };
                (v - m) / s
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Linear {
    /// `[out][in]`
    weight: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl Linear {
    fn in_features(&self) -> usize {
        self.weight.first().map(Vec::len).unwrap_or(0)
    }

    fn out_features(&self) -> usize {
        self.weight.len()
    }

    fn validate(&self, in_features: usize) -> std::result::Result<(), String> {
        if self.weight.is_empty() {
            return Err("linear layer has no outputs".to_string());
        }
        if self.weight.iter().any(|row| row.len() != in_features) {
            return Err(format!("linear layer rows must have {in_features} inputs"));
        }
        if self.bias.len() != self.out_features() {
            return Err(format!(
                "linear bias has {} values, expected {}",
                self.bias.len(),
                self.out_features()
            ));
        }
        Ok(())
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.weight
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect()
    }
}

fn default_eps() -> f64 {
    1e-5
}

#[derive(Debug, Clone, Deserialize)]
struct BatchNormWeights {
    weight: Vec<f64>,
    bias: Vec<f64>,
    running_mean: Vec<f64>,
    running_var: Vec<f64>,
    #[serde(default = "default_eps")]
    eps: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct BlockWeights {
    linear: Linear,
    #[serde(default)]
    batch_norm: Option<BatchNormWeights>,
}

#[derive(Debug, Deserialize)]
struct NetworkArtifact {
    input_dim: usize,
    blocks: Vec<BlockWeights>,
    head: Linear,
}

/// Frozen batch norm as `x * scale + shift`
#[derive(Debug, Clone)]
struct FrozenNorm {
    scale: Vec<f64>,
    shift: Vec<f64>,
}

impl FrozenNorm {
    fn fold(bn: &BatchNormWeights, width: usize) -> std::result::Result<Self, String> {
        if [
            bn.weight.len(),
            bn.bias.len(),
            bn.running_mean.len(),
            bn.running_var.len(),
        ]
        .iter()
        .any(|len| *len != width)
        {
            return Err(format!("batch norm parameters must have {width} values"));
        }
        if bn.running_var.iter().any(|v| *v + bn.eps <= 0.0) {
            return Err("batch norm running variance must be positive".to_string());
        }
        let scale: Vec<f64> = bn
            .weight
            .iter()
            .zip(&bn.running_var)
            .map(|(w, var)| w / (var + bn.eps).sqrt())
            .collect();
        let shift = bn
            .bias
            .iter()
            .zip(&bn.running_mean)
            .zip(&scale)
            .map(|((b, mean), s)| b - mean * s)
            .collect();
        Ok(Self { scale, shift })
    }

    fn apply(&self, x: &mut [f64]) {
        for ((v, s), t) in x.iter_mut().zip(&self.scale).zip(&self.shift) {
            *v = *v * s + t;
        }
    }
}

#[derive(Debug, Clone)]
struct Block {
    linear: Linear,
    norm: Option<FrozenNorm>,
}

impl Block {
    fn forward(&self, x: &[f64]) -> Vec<f64> {
        let mut y = self.linear.forward(x);
        if let Some(norm) = &self.norm {
            norm.apply(&mut y);
        }
        for v in y.iter_mut() {
            *v = v.max(0.0);
        }
        y
    }
}

/// Standardize, then run the stacked blocks and the head
#[derive(Debug)]
pub struct NetworkPredictor {
    scaler: Standardizer,
    blocks: Vec<Block>,
    head: Linear,
}

impl NetworkPredictor {
    /// Load network weights and the matching scaler
    pub fn load(model_path: &Path, scaler_path: &Path) -> Result<Self> {
        let scaler = Standardizer::load(scaler_path)?;
        let artifact: NetworkArtifact = read_json_artifact(model_path)?;
        let predictor = Self::from_artifact(artifact, scaler)
            .map_err(|reason| PredictorError::artifact(model_path, reason))?;
        debug!(
            input_dim = predictor.scaler.dim(),
            blocks = predictor.blocks.len(),
            outputs = predictor.head.out_features(),
            "Network weights loaded"
        );
        Ok(predictor)
    }

    fn from_artifact(
        artifact: NetworkArtifact,
        scaler: Standardizer,
    ) -> std::result::Result<Self, String> {
        if artifact.input_dim != scaler.dim() {
            return Err(format!(
                "network expects {} inputs but scaler has {}",
                artifact.input_dim,
                scaler.dim()
            ));
        }
        let mut width = artifact.input_dim;
        let mut blocks = Vec::with_capacity(artifact.blocks.len());
        for (i, block) in artifact.blocks.into_iter().enumerate() {
            block
                .linear
                .validate(width)
                .map_err(|e| format!("block {i}: {e}"))?;
            width = block.linear.out_features();
            let norm = block
                .batch_norm
                .as_ref()
                .map(|bn| FrozenNorm::fold(bn, width))
                .transpose()
                .map_err(|e| format!("block {i}: {e}"))?;
            blocks.push(Block {
                linear: block.linear,
                norm,
            });
        }
        artifact
            .head
            .validate(width)
            .map_err(|e| format!("head: {e}"))?;
        Ok(Self {
            scaler,
            blocks,
            head: artifact.head,
        })
    }
}

impl Predictor for NetworkPredictor {
    fn backend(&self) -> &'static str {
        "network"
    }

    fn input_dim(&self) -> usize {
        self.scaler.dim()
    }

    fn output_dim(&self) -> usize {
        self.head.out_features()
    }

    fn evaluate(&self, features: &[f64]) -> Result<Vec<f64>> {
        let mut x = self.scaler.transform(features);
        for block in &self.blocks {
            x = block.forward(&x);
        }
        debug_assert_eq!(x.len(), self.head.in_features());
        Ok(self.head.forward(&x))
    }
}
