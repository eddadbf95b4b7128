//! Held-out evaluation metrics

use crate::errors::TrainingError;
use serde::{Deserialize, Serialize};

/// Probability at or above which a prediction counts as positive
pub const DECISION_THRESHOLD: f64 = 0.5;

/// AUC reported when the held-out split has a single label class
pub const NEUTRAL_AUC: f64 = 0.5;

const LOG_LOSS_EPS: f64 = 1e-15;

/// Evaluation numbers that travel with every trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub auc: f64,
    /// Set when `auc` is the neutral value because the held-out split had
    /// only one label class
    pub auc_degenerate: bool,
    pub log_loss: f64,
    pub train_rows: usize,
    pub eval_rows: usize,
    pub eval_positives: usize,
}

impl Metrics {
    /// Score held-out `probabilities` against `labels`.
    pub fn evaluate(
        train_rows: usize,
        labels: &[u8],
        probabilities: &[f64],
    ) -> Result<Self, TrainingError> {
        if labels.len() != probabilities.len() {
            return Err(TrainingError::Evaluation(format!(
                "{} labels but {} predictions",
                labels.len(),
                probabilities.len()
            )));
        }
        if labels.is_empty() {
            return Err(TrainingError::Evaluation(
                "evaluation split is empty".to_string(),
            ));
        }
        if let Some(row) = probabilities
            .iter()
            .position(|p| !p.is_finite() || !(0.0..=1.0).contains(p))
        {
            return Err(TrainingError::Evaluation(format!(
                "prediction {} for eval row {row} is not a probability",
                probabilities[row]
            )));
        }

        let eval_positives = labels.iter().filter(|&&y| y == 1).count();
        let (auc, auc_degenerate) = match roc_auc(labels, probabilities) {
            Some(auc) => (auc, false),
            None => (NEUTRAL_AUC, true),
        };

        Ok(Self {
            accuracy: accuracy(labels, probabilities),
            auc,
            auc_degenerate,
            log_loss: log_loss(labels, probabilities),
            train_rows,
            eval_rows: labels.len(),
            eval_positives,
        })
    }
}

/// Fraction of rows whose thresholded prediction matches the label
pub fn accuracy(labels: &[u8], probabilities: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = labels
        .iter()
        .zip(probabilities)
        .filter(|&(&y, &p)| u8::from(p >= DECISION_THRESHOLD) == y)
        .count();
    correct as f64 / labels.len() as f64
}

/// Area under the ROC curve via the Mann-Whitney U statistic.
///
/// Tied scores share their average rank. Returns `None` when either class
/// is absent, where AUC is undefined.
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Option<f64> {
    let positives = labels.iter().filter(|&&y| y == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; the tie group spans ranks start+1..=end.
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let group_positives = order[start..end]
            .iter()
            .filter(|&&i| labels[i] == 1)
            .count();
        positive_rank_sum += average_rank * group_positives as f64;
        start = end;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// Mean binary cross-entropy with probabilities clipped away from 0 and 1
pub fn log_loss(labels: &[u8], probabilities: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = labels
        .iter()
        .zip(probabilities)
        .map(|(&y, &p)| {
            let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            if y == 1 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / labels.len() as f64
}
