//! Gradient-boosted regressor backend
//!
//! Each parameter has its own XGBoost regressor saved in XGBoost's JSON
//! model format. Only the fields needed to score a tree ensemble are parsed.

use super::artifacts::read_json_artifact;
use super::Predictor;
use crate::error::{PredictorError, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const LEAF: i32 = -1;

/// `base_score` is written as a number, a string, or a bracketed string like `"[5E-1]"`
fn deserialize_base_score<'de, D>(deserializer: D) -> std::result::Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .map(|f| f as f32)
            .ok_or_else(|| SerdeError::custom("invalid base_score")),
        Value::String(s) => {
            let t = s.trim();
            let t = t
                .strip_prefix('[')
                .and_then(|t| t.strip_suffix(']'))
                .unwrap_or(t);
            t.parse::<f32>()
                .map_err(|_| SerdeError::custom(format!("cannot parse base_score from '{s}'")))
        }
        Value::Array(arr) => arr
            .first()
            .and_then(Value::as_f64)
            .map(|f| f as f32)
            .ok_or_else(|| SerdeError::custom("base_score array must hold a number")),
        _ => Err(SerdeError::custom(
            "base_score must be a number, string, or array",
        )),
    }
}

#[derive(Debug, Deserialize)]
struct XgbModelFile {
    learner: Learner,
}

#[derive(Debug, Deserialize)]
struct Learner {
    #[serde(default)]
    attributes: HashMap<String, String>,
    gradient_booster: GradientBooster,
    objective: Objective,
    learner_model_param: LearnerModelParam,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
enum GradientBooster {
    Gbtree { model: ModelTrees },
}

#[derive(Debug, Deserialize)]
struct ModelTrees {
    trees: Vec<Tree>,
    gbtree_model_param: GbTreeModelParam,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct GbTreeModelParam {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default = "default_parallel_tree")]
    num_parallel_tree: usize,
}

fn default_parallel_tree() -> usize {
    1
}

#[derive(Debug, Deserialize)]
struct Objective {
    name: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    #[serde(deserialize_with = "deserialize_base_score")]
    base_score: f32,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    num_feature: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct Tree {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<i32>,
    /// Split threshold for inner nodes, leaf value for leaves
    split_conditions: Vec<f32>,
    default_left: Vec<i32>,
}

impl Tree {
    fn validate(&self, num_feature: usize) -> std::result::Result<(), String> {
        let n = self.left_children.len();
        if n == 0 {
            return Err("tree has no nodes".to_string());
        }
        if [
            self.right_children.len(),
            self.split_indices.len(),
            self.split_conditions.len(),
            self.default_left.len(),
        ]
        .iter()
        .any(|len| *len != n)
        {
            return Err("tree arrays have inconsistent lengths".to_string());
        }
        for node in 0..n {
            let (left, right) = (self.left_children[node], self.right_children[node]);
            if left == LEAF {
                continue;
            }
            for child in [left, right] {
                if child <= node as i32 || child as usize >= n {
                    return Err(format!("node {node} has invalid child {child}"));
                }
            }
            let split = self.split_indices[node];
            if split < 0 || split as usize >= num_feature {
                return Err(format!("node {node} splits on invalid feature {split}"));
            }
        }
        Ok(())
    }

    fn leaf_value(&self, x: &[f64]) -> f32 {
        let mut node = 0usize;
        while self.left_children[node] != LEAF {
            let value = x[self.split_indices[node] as usize] as f32;
            let go_left = if value.is_nan() {
                self.default_left[node] != 0
            } else {
                value < self.split_conditions[node]
            };
            node = if go_left {
                self.left_children[node] as usize
            } else {
                self.right_children[node] as usize
            };
        }
        self.split_conditions[node]
    }
}

/// Link from margin to output space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputTransform {
    Identity,
    Sigmoid,
}

impl OutputTransform {
    fn for_objective(name: &str) -> std::result::Result<Self, String> {
        match name {
            "reg:squarederror" | "reg:linear" | "reg:pseudohubererror" | "reg:absoluteerror" => {
                Ok(OutputTransform::Identity)
            }
            "reg:logistic" | "binary:logistic" => Ok(OutputTransform::Sigmoid),
            other => Err(format!("unsupported objective '{other}'")),
        }
    }

    /// `base_score` is stored in output space
    fn base_margin(self, base_score: f32) -> f32 {
        match self {
            OutputTransform::Identity => base_score,
            OutputTransform::Sigmoid => {
                let p = base_score.clamp(1e-7, 1.0 - 1e-7);
                (p / (1.0 - p)).ln()
            }
        }
    }

    fn apply(self, margin: f64) -> f64 {
        match self {
            OutputTransform::Identity => margin,
            OutputTransform::Sigmoid => 1.0 / (1.0 + (-margin).exp()),
        }
    }
}

/// A single XGBoost regression model
#[derive(Debug, Clone)]
pub struct XgbRegressor {
    num_feature: usize,
    base_margin: f32,
    transform: OutputTransform,
    trees: Vec<Tree>,
}

impl XgbRegressor {
    /// Load a model, keeping only the trees up to the recorded best iteration
    pub fn load(path: &Path) -> Result<Self> {
        let file: XgbModelFile = read_json_artifact(path)?;
        let regressor =
            Self::from_learner(file.learner).map_err(|reason| PredictorError::artifact(path, reason))?;
        debug!(
            path = %path.display(),
            trees = regressor.trees.len(),
            num_feature = regressor.num_feature,
            "XGBoost model loaded"
        );
        Ok(regressor)
    }

    fn from_learner(learner: Learner) -> std::result::Result<Self, String> {
        let num_feature = learner.learner_model_param.num_feature;
        if num_feature == 0 {
            return Err("num_feature must be positive".to_string());
        }
        let transform = OutputTransform::for_objective(&learner.objective.name)?;
        let GradientBooster::Gbtree { model } = learner.gradient_booster;
        let mut trees = model.trees;
        for (i, tree) in trees.iter().enumerate() {
            tree.validate(num_feature)
                .map_err(|e| format!("tree {i}: {e}"))?;
        }

        // early stopping keeps every round in the file; scoring stops at the best one
        if let Some(best) = learner.attributes.get("best_iteration") {
            let best: usize = best
                .trim()
                .parse()
                .map_err(|_| format!("invalid best_iteration '{best}'"))?;
            let per_round = model.gbtree_model_param.num_parallel_tree.max(1);
            trees.truncate((best + 1).saturating_mul(per_round));
        }

        Ok(Self {
            num_feature,
            base_margin: transform.base_margin(learner.learner_model_param.base_score),
            transform,
            trees,
        })
    }

    pub fn num_feature(&self) -> usize {
        self.num_feature
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Score one feature vector of length [`num_feature`](Self::num_feature)
    pub fn predict(&self, x: &[f64]) -> Result<f64> {
        if x.len() != self.num_feature {
            return Err(PredictorError::Shape {
                backend: "boosted",
                expected: self.num_feature,
                actual: x.len(),
            });
        }
        let margin = self
            .trees
            .iter()
            .fold(self.base_margin, |acc, tree| acc + tree.leaf_value(x));
        Ok(self.transform.apply(margin as f64))
    }
}

/// One regressor per parameter, evaluated in parameter order
#[derive(Debug)]
pub struct BoostedPredictor {
    input_dim: usize,
    regressors: Vec<XgbRegressor>,
}

impl BoostedPredictor {
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        let Some(first) = paths.first() else {
            return Err(PredictorError::Backend {
                backend: "boosted",
                reason: "no model files configured".to_string(),
            });
        };
        let regressors = paths
            .iter()
            .map(|path| XgbRegressor::load(path))
            .collect::<Result<Vec<_>>>()?;
        let input_dim = regressors[0].num_feature();
        if let Some((path, other)) = paths
            .iter()
            .zip(&regressors)
            .find(|(_, r)| r.num_feature() != input_dim)
        {
            return Err(PredictorError::artifact(
                path,
                format!(
                    "model expects {} features but {} expects {}",
                    other.num_feature(),
                    first.display(),
                    input_dim
                ),
            ));
        }
        Ok(Self {
            input_dim,
            regressors,
        })
    }
}

impl Predictor for BoostedPredictor {
    fn backend(&self) -> &'static str {
        "boosted"
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn output_dim(&self) -> usize {
        self.regressors.len()
    }

    fn evaluate(&self, features: &[f64]) -> Result<Vec<f64>> {
        self.regressors.iter().map(|r| r.predict(features)).collect()
    }
}
