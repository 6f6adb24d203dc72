//! Random-forest classifier backend
//!
//! The artifact holds one forest per parameter in the layout of
//! scikit-learn's fitted tree arrays (`children_left`, `children_right`,
//! `feature`, `threshold`, `value`), plus the optional imputation and
//! standardization steps that preceded the classifier during training.
//! A single `predict` call yields every parameter at once.

use super::artifacts::read_json_artifact;
use super::network::Standardizer;
use super::Predictor;
use crate::error::{PredictorError, Result};
use crate::observability::StructuredLogger;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

const LEAF: i64 = -1;

/// Feature preprocessing applied before the trees
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Preprocessing {
    /// Replacement for missing (`NaN`) features, usually training medians
    #[serde(default)]
    pub impute: Option<Vec<f64>>,
    #[serde(default)]
    pub scaler: Option<Standardizer>,
}

impl Preprocessing {
    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        if let Some(impute) = &self.impute {
            if impute.len() != n_features {
                return Err(format!(
                    "impute has {} values, expected {}",
                    impute.len(),
                    n_features
                ));
            }
        }
        if let Some(scaler) = &self.scaler {
            scaler.validate(n_features)?;
        }
        Ok(())
    }

    pub fn apply(&self, features: &[f64]) -> Vec<f64> {
        let mut x = features.to_vec();
        if let Some(impute) = &self.impute {
            for (value, fill) in x.iter_mut().zip(impute) {
                if value.is_nan() {
                    *value = *fill;
                }
            }
        }
        match &self.scaler {
            Some(scaler) => scaler.transform(&x),
            None => x,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DecisionTree {
    children_left: Vec<i64>,
    children_right: Vec<i64>,
    feature: Vec<i64>,
    threshold: Vec<f64>,
    /// Per-node class weights
    value: Vec<Vec<f64>>,
}

impl DecisionTree {
    fn validate(&self, n_features: usize, n_classes: usize) -> std::result::Result<(), String> {
        let n = self.children_left.len();
        if n == 0 {
            return Err("tree has no nodes".to_string());
        }
        if [
            self.children_right.len(),
            self.feature.len(),
            self.threshold.len(),
            self.value.len(),
        ]
        .iter()
        .any(|len| *len != n)
        {
            return Err("tree arrays have inconsistent lengths".to_string());
        }
        for node in 0..n {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if self.value[node].len() != n_classes {
                return Err(format!(
                    "node {node} has {} class weights, expected {n_classes}",
                    self.value[node].len()
                ));
            }
            if left == LEAF && right == LEAF {
                continue;
            }
            // children always follow their parent, so traversal terminates
            for child in [left, right] {
                if child <= node as i64 || child >= n as i64 {
                    return Err(format!("node {node} has invalid child {child}"));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature as usize >= n_features {
                return Err(format!("node {node} splits on invalid feature {feature}"));
            }
        }
        Ok(())
    }

    /// Class weights at the leaf reached by `x`
    fn leaf(&self, x: &[f64]) -> &[f64] {
        let mut node = 0usize;
        while self.children_left[node] != LEAF {
            // thresholds are compared in single precision, like the training library
            let value = x[self.feature[node] as usize] as f32 as f64;
            node = if value <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        &self.value[node]
    }
}

/// Winning class of one output and its mean probability across trees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassVote {
    pub label: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct ClassifierForest {
    classes: Vec<f64>,
    trees: Vec<DecisionTree>,
}

impl ClassifierForest {
    /// Mean class probability across trees, then the most probable label
    fn vote(&self, x: &[f64]) -> ClassVote {
        let mut proba = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            let weights = tree.leaf(x);
            let total: f64 = weights.iter().sum();
            if total > 0.0 {
                for (p, w) in proba.iter_mut().zip(weights) {
                    *p += w / total;
                }
            }
        }
        // first maximum wins ties
        let mut best = 0;
        for (i, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = i;
            }
        }
        ClassVote {
            label: self.classes[best],
            confidence: proba[best] / self.trees.len() as f64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForestArtifact {
    n_features: usize,
    #[serde(default)]
    preprocessing: Preprocessing,
    estimators: Vec<ClassifierForest>,
}

/// Multi-output random-forest classifier
#[derive(Debug)]
pub struct ForestPredictor {
    n_features: usize,
    preprocessing: Preprocessing,
    estimators: Vec<ClassifierForest>,
    logger: StructuredLogger,
}

impl ForestPredictor {
    /// Load and validate a forest artifact
    pub fn load(path: &Path) -> Result<Self> {
        let artifact: ForestArtifact = read_json_artifact(path)?;
        let predictor = Self::from_artifact(artifact)
            .map_err(|reason| PredictorError::artifact(path, reason))?;
        debug!(
            outputs = predictor.estimators.len(),
            trees = predictor.estimators.iter().map(|e| e.trees.len()).sum::<usize>(),
            n_features = predictor.n_features,
            "Random forest loaded"
        );
        Ok(predictor)
    }

    fn from_artifact(artifact: ForestArtifact) -> std::result::Result<Self, String> {
        let n_features = artifact.n_features;
        if n_features == 0 {
            return Err("n_features must be positive".to_string());
        }
        if artifact.estimators.is_empty() {
            return Err("artifact has no estimators".to_string());
        }
        artifact.preprocessing.validate(n_features)?;
        for (i, estimator) in artifact.estimators.iter().enumerate() {
            if estimator.classes.is_empty() {
                return Err(format!("estimator {i} has no classes"));
            }
            if estimator.trees.is_empty() {
                return Err(format!("estimator {i} has no trees"));
            }
            for (t, tree) in estimator.trees.iter().enumerate() {
                tree.validate(n_features, estimator.classes.len())
                    .map_err(|e| format!("estimator {i} tree {t}: {e}"))?;
            }
        }
        Ok(Self {
            n_features,
            preprocessing: artifact.preprocessing,
            estimators: artifact.estimators,
            logger: StructuredLogger::new("forest"),
        })
    }

    /// Classify every output, keeping the probability behind each label
    pub fn vote(&self, features: &[f64]) -> Result<Vec<ClassVote>> {
        if features.len() != self.n_features {
            return Err(PredictorError::Shape {
                backend: "forest",
                expected: self.n_features,
                actual: features.len(),
            });
        }
        let x = self.preprocessing.apply(features);
        Ok(self.estimators.iter().map(|e| e.vote(&x)).collect())
    }
}

impl Predictor for ForestPredictor {
    fn backend(&self) -> &'static str {
        "forest"
    }

    fn input_dim(&self) -> usize {
        self.n_features
    }

    fn output_dim(&self) -> usize {
        self.estimators.len()
    }

    fn evaluate(&self, features: &[f64]) -> Result<Vec<f64>> {
        let votes = self.vote(features)?;
        for (output, vote) in votes.iter().enumerate() {
            self.logger.log_confidence(output, vote.label, vote.confidence);
        }
        Ok(votes.iter().map(|v| v.label).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureVector;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_artifact(value: serde_json::Value) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", value).unwrap();
        file
    }

    /// Two outputs over three features: the first splits on feature 0 at 0.5,
    /// the second is a stump that always votes for class 4
    fn small_forest() -> serde_json::Value {
        json!({
            "n_features": 3,
            "estimators": [
                {
                    "classes": [0, 1, 2],
                    "trees": [
                        {
                            "children_left": [1, -1, -1],
                            "children_right": [2, -1, -1],
                            "feature": [0, -2, -2],
                            "threshold": [0.5, -2.0, -2.0],
                            "value": [[3.0, 3.0, 3.0], [6.0, 0.0, 0.0], [0.0, 1.0, 5.0]]
                        },
                        {
                            "children_left": [1, -1, -1],
                            "children_right": [2, -1, -1],
                            "feature": [0, -2, -2],
                            "threshold": [0.5, -2.0, -2.0],
                            "value": [[3.0, 3.0, 3.0], [4.0, 2.0, 0.0], [0.0, 3.0, 3.0]]
                        }
                    ]
                },
                {
                    "classes": [0, 4],
                    "trees": [
                        {
                            "children_left": [-1],
                            "children_right": [-1],
                            "feature": [-2],
                            "threshold": [-2.0],
                            "value": [[1.0, 9.0]]
                        }
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_predicts_all_outputs_together() {
        let file = write_artifact(small_forest());
        let forest = ForestPredictor::load(file.path()).unwrap();
        assert_eq!(forest.input_dim(), 3);
        assert_eq!(forest.output_dim(), 2);

        let low = forest.predict(&FeatureVector::from(vec![0.2, 9.0, 9.0])).unwrap();
        assert_eq!(low, vec![0.0, 4.0]);

        // right leaves: mean proba = [0, (1/6 + 3/6)/2, (5/6 + 3/6)/2] -> class 2
        let high = forest.predict(&FeatureVector::from(vec![0.7, 0.0, 0.0])).unwrap();
        assert_eq!(high, vec![2.0, 4.0]);
    }

    #[test]
    fn test_vote_reports_mean_probability() {
        let file = write_artifact(small_forest());
        let forest = ForestPredictor::load(file.path()).unwrap();

        let high = forest.vote(&[0.7, 0.0, 0.0]).unwrap();
        assert_eq!(high[0].label, 2.0);
        assert!((high[0].confidence - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(high[1].label, 4.0);
        assert!((high[1].confidence - 0.9).abs() < 1e-12);

        // left leaves: mean proba = [(1 + 4/6)/2, (0 + 2/6)/2, 0]
        let low = forest.vote(&[0.2, 0.0, 0.0]).unwrap();
        assert_eq!(low[0].label, 0.0);
        assert!((low[0].confidence - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_vote_checks_length() {
        let file = write_artifact(small_forest());
        let forest = ForestPredictor::load(file.path()).unwrap();
        assert!(matches!(
            forest.vote(&[0.1]),
            Err(PredictorError::Shape { expected: 3, actual: 1, .. })
        ));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let file = write_artifact(small_forest());
        let forest = ForestPredictor::load(file.path()).unwrap();
        let at = forest.predict(&FeatureVector::from(vec![0.5, 0.0, 0.0])).unwrap();
        assert_eq!(at[0], 0.0);
    }

    #[test]
    fn test_preprocessing_applied_before_trees() {
        let mut artifact = small_forest();
        artifact["preprocessing"] = json!({
            "impute": [10.0, 0.0, 0.0],
            "scaler": {"mean": [10.0, 0.0, 0.0], "scale": [2.0, 1.0, 1.0]}
        });
        let file = write_artifact(artifact);
        let forest = ForestPredictor::load(file.path()).unwrap();

        // (12 - 10) / 2 = 1.0 goes right
        let out = forest.predict(&FeatureVector::from(vec![12.0, 0.0, 0.0])).unwrap();
        assert_eq!(out[0], 2.0);
        // NaN imputed to the mean, standardized to 0.0, goes left
        let out = forest
            .predict(&FeatureVector::from(vec![f64::NAN, 0.0, 0.0]))
            .unwrap();
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn test_wrong_length_is_shape_error() {
        let file = write_artifact(small_forest());
        let forest = ForestPredictor::load(file.path()).unwrap();
        let err = forest.predict(&FeatureVector::from(vec![0.1; 4])).unwrap_err();
        assert!(matches!(
            err,
            PredictorError::Shape {
                backend: "forest",
                expected: 3,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_invalid_child_rejected_at_load() {
        let mut artifact = small_forest();
        artifact["estimators"][0]["trees"][0]["children_left"] = json!([0, -1, -1]);
        let file = write_artifact(artifact);
        let err = ForestPredictor::load(file.path()).unwrap_err();
        assert!(err.is_artifact_error());
        assert!(err.to_string().contains("invalid child"));
    }

    #[test]
    fn test_class_weight_width_checked() {
        let mut artifact = small_forest();
        artifact["estimators"][1]["trees"][0]["value"] = json!([[1.0, 2.0, 3.0]]);
        let file = write_artifact(artifact);
        assert!(ForestPredictor::load(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_artifact_error() {
        let err = ForestPredictor::load(Path::new("/nonexistent/forest_model.json")).unwrap_err();
        assert!(err.is_artifact_error());
    }

    #[test]
    fn test_corrupt_file_is_artifact_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{\"n_features\": 3, \"estimators\": [").unwrap();
        let err = ForestPredictor::load(file.path()).unwrap_err();
        assert!(err.is_artifact_error());
    }
}
