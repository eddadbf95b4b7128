//! Split, fit and evaluate
//!
//! The classifier is a capability behind [`Classifier`]; this module owns
//! the protocol around it: input checks, deterministic split, held-out
//! evaluation. A fitted model never leaves here without its metrics.

use crate::config::SplitConfig;
use crate::errors::{InsufficientDataError, InsufficientReason, PipelineError, TrainingError};
use crate::features::TrainingExample;
use crate::metrics::Metrics;
use crate::split::split;
use gathr_gbdt::{GbdtParams, GbdtTrainer, Model};
use serde_json::{json, Value};
use tracing::{info, warn};

/// A fitted model that scores feature rows
pub trait ScoringModel: Send + Sync {
    /// Probability of the positive class for each row
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64>;

    /// Serialized form written by the model registry
    fn to_artifact_bytes(&self) -> Result<Vec<u8>, TrainingError>;

    /// Short description of the algorithm and its shape for the sidecar
    fn describe(&self) -> Value;
}

/// Something that can fit a binary classifier
pub trait Classifier {
    type Model: ScoringModel;

    fn fit(&self, features: &[Vec<f64>], labels: &[u8]) -> Result<Self::Model, TrainingError>;
}

/// Gradient boosted trees from `gathr-gbdt`
pub struct GbdtClassifier {
    trainer: GbdtTrainer,
}

impl GbdtClassifier {
    pub fn new(params: GbdtParams) -> Self {
        Self {
            trainer: GbdtTrainer::new(params),
        }
    }
}

impl Classifier for GbdtClassifier {
    type Model = Model;

    fn fit(&self, features: &[Vec<f64>], labels: &[u8]) -> Result<Model, TrainingError> {
        self.trainer
            .fit(features, labels)
            .map_err(|e| TrainingError::Fit(e.to_string()))
    }
}

impl ScoringModel for Model {
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        self.predict_proba_batch(rows)
    }

    fn to_artifact_bytes(&self) -> Result<Vec<u8>, TrainingError> {
        self.to_canonical_json()
            .map(String::into_bytes)
            .map_err(|e| TrainingError::Fit(format!("model serialization failed: {e}")))
    }

    fn describe(&self) -> Value {
        json!({
            "algorithm": "gbdt",
            "library": format!("gathr-gbdt {}", gathr_gbdt::VERSION),
            "objective": self.objective,
            "format_version": self.version,
            "feature_count": self.feature_count,
            "num_trees": self.trees.len(),
            "max_depth": self.max_depth(),
            "base_score": self.base_score,
        })
    }
}

/// A fitted model paired with its held-out evaluation
#[derive(Debug, Clone)]
pub struct TrainedModel<M> {
    pub model: M,
    pub metrics: Metrics,
}

/// Check inputs, split, fit on the train side and score the held-out side.
///
/// Fails with [`InsufficientDataError`] on empty input, and on a single
/// label class unless `allow_single_class` is set. A single-class held-out
/// split is not an error; its AUC is reported as neutral and flagged.
pub fn train_and_evaluate<C: Classifier>(
    classifier: &C,
    examples: &[TrainingExample],
    split_config: &SplitConfig,
    allow_single_class: bool,
) -> Result<TrainedModel<C::Model>, PipelineError> {
    let total = examples.len();
    let positives = examples.iter().filter(|e| e.label == 1).count();

    if total == 0 {
        return Err(InsufficientDataError {
            reason: InsufficientReason::EmptyInput,
            examples: 0,
            positives: 0,
        }
        .into());
    }
    if positives == 0 || positives == total {
        if !allow_single_class {
            return Err(InsufficientDataError {
                reason: InsufficientReason::SingleClass,
                examples: total,
                positives,
            }
            .into());
        }
        warn!(
            examples = total,
            positives, "training on a single label class; metrics will be degenerate"
        );
    }

    let parts = split(examples, split_config)?;
    let (train_features, train_labels) = columns(&parts.train);
    let (eval_features, eval_labels) = columns(&parts.eval);

    info!(
        train_rows = parts.train.len(),
        eval_rows = parts.eval.len(),
        seed = split_config.seed,
        "fitting classifier"
    );
    let model = classifier.fit(&train_features, &train_labels)?;

    let probabilities = model.predict_proba(&eval_features);
    let metrics = Metrics::evaluate(parts.train.len(), &eval_labels, &probabilities)?;

    if metrics.auc_degenerate {
        warn!(
            eval_rows = metrics.eval_rows,
            eval_positives = metrics.eval_positives,
            "held-out split has a single label class; reporting neutral AUC"
        );
    }
    info!(
        accuracy = metrics.accuracy,
        auc = metrics.auc,
        log_loss = metrics.log_loss,
        "evaluation complete"
    );

    Ok(TrainedModel { model, metrics })
}

fn columns(examples: &[TrainingExample]) -> (Vec<Vec<f64>>, Vec<u8>) {
    examples
        .iter()
        .map(|e| (e.features.clone(), e.label))
        .unzip()
}
