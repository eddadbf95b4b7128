//! Integration tests for the deterministic GBDT classifier
//!
//! Ensures identical models across runs and sane probability output.

use anyhow::Result;
use gathr_gbdt::{GbdtParams, GbdtTrainer, Model};
use proptest::prelude::*;

/// Hour-of-day style data where late hours convert more often
fn synthetic_rows() -> (Vec<Vec<f64>>, Vec<u8>) {
    let mut features = Vec::new();
    let mut labels = Vec::new();
    for hour in 0..24u32 {
        for day in 0..7u32 {
            features.push(vec![f64::from(hour), f64::from(day)]);
            labels.push(u8::from(hour >= 18 || (day == 6 && hour >= 12)));
        }
    }
    (features, labels)
}

fn params() -> GbdtParams {
    GbdtParams {
        num_trees: 8,
        max_depth: 3,
        ..GbdtParams::default()
    }
}

#[test]
fn test_deterministic_training() -> Result<()> {
    let (features, labels) = synthetic_rows();

    let model1 = GbdtTrainer::new(params()).fit(&features, &labels)?;
    let model2 = GbdtTrainer::new(params()).fit(&features, &labels)?;

    assert_eq!(model1.base_score, model2.base_score, "Bias should be identical");
    assert_eq!(model1.trees.len(), model2.trees.len());
    for (i, (tree1, tree2)) in model1.trees.iter().zip(model2.trees.iter()).enumerate() {
        assert_eq!(tree1, tree2, "Tree {} should be identical", i);
    }

    assert_eq!(model1.to_canonical_json()?, model2.to_canonical_json()?);
    assert_eq!(model1.model_hash()?, model2.model_hash()?);

    Ok(())
}

#[test]
fn test_model_separates_classes() -> Result<()> {
    let (features, labels) = synthetic_rows();
    let model = GbdtTrainer::new(params()).fit(&features, &labels)?;

    let correct = features
        .iter()
        .zip(&labels)
        .filter(|(row, &label)| u8::from(model.predict_proba(row) >= 0.5) == label)
        .count();
    assert!(correct as f64 / labels.len() as f64 > 0.95);

    Ok(())
}

#[test]
fn test_serialized_model_scores_identically() -> Result<()> {
    let (features, labels) = synthetic_rows();
    let model = GbdtTrainer::new(params()).fit(&features, &labels)?;

    let json = model.to_canonical_json()?;
    let restored = Model::from_json_slice(json.as_bytes())?;

    for row in &features {
        assert_eq!(model.predict_proba(row), restored.predict_proba(row));
    }
    Ok(())
}

proptest! {
    #[test]
    fn probabilities_stay_in_unit_interval(
        hour in 0.0f64..24.0,
        day in 0.0f64..7.0,
    ) {
        let (features, labels) = synthetic_rows();
        let model = GbdtTrainer::new(GbdtParams { num_trees: 2, max_depth: 2, ..GbdtParams::default() })
            .fit(&features, &labels)
            .unwrap();
        let p = model.predict_proba(&[hour, day]);
        prop_assert!((0.0..=1.0).contains(&p));
    }
}
