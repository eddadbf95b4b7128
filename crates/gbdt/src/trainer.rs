//! Gradient Boosted Decision Tree (GBDT) trainer
//!
//! Implements deterministic GBDT training for binary classification with
//! the logistic loss and exact-greedy CART trees.

use crate::cart::{CartBuilder, TreeConfig};
use crate::errors::GbdtError;
use crate::model::{sigmoid, Model};
use serde::{Deserialize, Serialize};

/// Probabilities are clamped into (EPS, 1 - EPS) when computing log-odds.
const PROB_EPS: f64 = 1e-6;
const MIN_HESSIAN: f64 = 1e-16;

/// GBDT training configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GbdtParams {
    pub num_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub min_child_weight: f64,
    pub learning_rate: f64,
    pub lambda: f64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            num_trees: 100,
            max_depth: 6,
            min_samples_leaf: 1,
            min_child_weight: 1.0,
            learning_rate: 0.3,
            lambda: 1.0,
        }
    }
}

impl GbdtParams {
    pub fn validate(&self) -> Result<(), GbdtError> {
        if self.num_trees == 0 {
            return Err(GbdtError::InvalidParams("num_trees must be > 0".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(GbdtError::InvalidParams(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if self.lambda < 0.0 || self.min_child_weight < 0.0 {
            return Err(GbdtError::InvalidParams(
                "lambda and min_child_weight must be non-negative".into(),
            ));
        }
        Ok(())
    }

    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            min_child_weight: self.min_child_weight,
            lambda: self.lambda,
        }
    }
}

/// GBDT trainer
pub struct GbdtTrainer {
    params: GbdtParams,
}

impl GbdtTrainer {
    pub fn new(params: GbdtParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &GbdtParams {
        &self.params
    }

    /// Fit a binary classifier. `labels` must hold only 0 and 1.
    pub fn fit(&self, features: &[Vec<f64>], labels: &[u8]) -> Result<Model, GbdtError> {
        self.params.validate()?;
        let feature_count = check_inputs(features, labels)?;

        let base_score = log_odds(labels);
        let targets: Vec<f64> = labels.iter().map(|&y| f64::from(y)).collect();
        let mut margins = vec![base_score; features.len()];
        let tree_config = self.params.tree_config();

        let mut trees = Vec::with_capacity(self.params.num_trees);
        for tree_idx in 0..self.params.num_trees {
            let (gradients, hessians) = gradients_hessians(&targets, &margins);

            let mut tree =
                CartBuilder::new(features, &gradients, &hessians, tree_config.clone()).build();
            tree.weight = self.params.learning_rate;

            for (margin, row) in margins.iter_mut().zip(features) {
                *margin += tree.contribution(row);
            }

            tracing::debug!(
                tree = tree_idx + 1,
                total = self.params.num_trees,
                nodes = tree.nodes.len(),
                "fitted tree"
            );
            trees.push(tree);
        }

        let model = Model::new(feature_count, base_score, trees);
        model.validate()?;
        Ok(model)
    }
}

fn check_inputs(features: &[Vec<f64>], labels: &[u8]) -> Result<usize, GbdtError> {
    if features.is_empty() {
        return Err(GbdtError::EmptyDataset);
    }
    if features.len() != labels.len() {
        return Err(GbdtError::LengthMismatch {
            features: features.len(),
            labels: labels.len(),
        });
    }

    let feature_count = features[0].len();
    if feature_count == 0 {
        return Err(GbdtError::DimensionMismatch {
            row: 0,
            expected: 1,
            got: 0,
        });
    }

    for (row, (values, &label)) in features.iter().zip(labels).enumerate() {
        if values.len() != feature_count {
            return Err(GbdtError::DimensionMismatch {
                row,
                expected: feature_count,
                got: values.len(),
            });
        }
        if let Some(feature) = values.iter().position(|v| !v.is_finite()) {
            return Err(GbdtError::NonFiniteFeature { row, feature });
        }
        if label > 1 {
            return Err(GbdtError::InvalidLabel { row, label });
        }
    }

    Ok(feature_count)
}

/// Initial margin: log-odds of the positive rate
fn log_odds(labels: &[u8]) -> f64 {
    let positives = labels.iter().filter(|&&y| y == 1).count() as f64;
    let p = (positives / labels.len() as f64).clamp(PROB_EPS, 1.0 - PROB_EPS);
    (p / (1.0 - p)).ln()
}

/// Logistic loss derivatives: g = p - y, h = p(1 - p)
fn gradients_hessians(targets: &[f64], margins: &[f64]) -> (Vec<f64>, Vec<f64>) {
    targets
        .iter()
        .zip(margins)
        .map(|(&y, &m)| {
            let p = sigmoid(m);
            (p - y, (p * (1.0 - p)).max(MIN_HESSIAN))
        })
        .unzip()
}
