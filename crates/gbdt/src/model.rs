//! Boosted ensemble model with probability scoring
//!
//! The margin for a row is `base_score + sum(tree.weight * tree.evaluate(row))`
//! and the probability is the logistic sigmoid of that margin. Models carry
//! no timestamps so that identical training runs serialize identically.

use crate::errors::GbdtError;
use crate::serialization::{blake3_hex, canonical_json_string};
use crate::tree::Tree;
use serde::{Deserialize, Serialize};

/// Objective identifier stored in every model artifact
pub const OBJECTIVE_BINARY_LOGISTIC: &str = "binary:logistic";

/// Current model format version
pub const FORMAT_VERSION: i32 = 1;

/// Numerically stable logistic function
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    /// Model format version
    pub version: i32,

    /// Training objective (always `binary:logistic` for now)
    pub objective: String,

    /// Number of features every scored row must carry
    pub feature_count: usize,

    /// Initial margin (log-odds of the training positive rate)
    pub base_score: f64,

    /// Trees in boosting order
    pub trees: Vec<Tree>,
}

impl Model {
    pub fn new(feature_count: usize, base_score: f64, trees: Vec<Tree>) -> Self {
        Self {
            version: FORMAT_VERSION,
            objective: OBJECTIVE_BINARY_LOGISTIC.to_string(),
            feature_count,
            base_score,
            trees,
        }
    }

    /// Raw additive score before the sigmoid
    pub fn predict_margin(&self, features: &[f64]) -> f64 {
        self.trees
            .iter()
            .fold(self.base_score, |acc, tree| acc + tree.contribution(features))
    }

    /// Probability of the positive class, in [0, 1]
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        sigmoid(self.predict_margin(features))
    }

    /// Probabilities for a batch of rows
    pub fn predict_proba_batch(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_proba(row)).collect()
    }

    pub fn validate(&self) -> Result<(), GbdtError> {
        if self.version != FORMAT_VERSION {
            return Err(GbdtError::Validation(format!(
                "unsupported model version: {}",
                self.version
            )));
        }
        if self.objective != OBJECTIVE_BINARY_LOGISTIC {
            return Err(GbdtError::Validation(format!(
                "unsupported objective: {}",
                self.objective
            )));
        }
        if self.feature_count == 0 {
            return Err(GbdtError::Validation("feature_count is zero".to_string()));
        }
        if !self.base_score.is_finite() {
            return Err(GbdtError::Validation("base_score is not finite".to_string()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_count)
                .map_err(|e| GbdtError::Validation(format!("tree {i}: {e}")))?;
        }
        Ok(())
    }

    /// Canonical JSON representation (sorted keys, two-space indent)
    pub fn to_canonical_json(&self) -> Result<String, GbdtError> {
        Ok(canonical_json_string(self)?)
    }

    /// Parse and validate a model from JSON bytes
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, GbdtError> {
        let model: Model = serde_json::from_slice(bytes)?;
        model.validate()?;
        Ok(model)
    }

    /// BLAKE3 hash of the canonical JSON encoding
    pub fn model_hash(&self) -> Result<String, GbdtError> {
        Ok(blake3_hex(self.to_canonical_json()?.as_bytes()))
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(Tree::depth).max().unwrap_or(0)
    }
}
