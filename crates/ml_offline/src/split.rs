//! Deterministic train/evaluation split

use crate::config::SplitConfig;
use crate::errors::{InsufficientDataError, InsufficientReason};
use crate::features::TrainingExample;
use gathr_gbdt::LcgRng;

/// Train and held-out evaluation partitions
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Vec<TrainingExample>,
    pub eval: Vec<TrainingExample>,
}

/// Partition `examples` with a seeded permutation.
///
/// The same examples in the same order with the same seed always yield the
/// same split. The evaluation side gets `ceil(n * test_fraction)` examples
/// and both sides are non-empty.
pub fn split(
    examples: &[TrainingExample],
    config: &SplitConfig,
) -> Result<Split, InsufficientDataError> {
    let n = examples.len();
    if n < 2 {
        let positives = examples.iter().filter(|e| e.label == 1).count();
        return Err(InsufficientDataError {
            reason: if n == 0 {
                InsufficientReason::EmptyInput
            } else {
                InsufficientReason::TooFewExamples
            },
            examples: n,
            positives,
        });
    }

    let n_eval = eval_size(n, config.test_fraction);
    let mut order: Vec<usize> = (0..n).collect();
    LcgRng::new(config.seed).shuffle(&mut order);

    let (eval_idx, train_idx) = order.split_at(n_eval);
    Ok(Split {
        train: train_idx.iter().map(|&i| examples[i].clone()).collect(),
        eval: eval_idx.iter().map(|&i| examples[i].clone()).collect(),
    })
}

fn eval_size(n: usize, test_fraction: f64) -> usize {
    let raw = (n as f64 * test_fraction).ceil() as usize;
    raw.clamp(1, n - 1)
}
