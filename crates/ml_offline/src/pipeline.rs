//! Command orchestration
//!
//! `extract`: event source → snapshot file.
//! `train`: snapshot file → examples → split/fit/evaluate → registry.
//! Each stage runs to completion before the next starts.

use crate::config::PipelineConfig;
use crate::dataset::{self, ArtifactRef};
use crate::errors::{InsufficientDataError, InsufficientReason, PipelineError};
use crate::event::ExtractionWindow;
use crate::features::{BuildReport, ExampleBuilder, TemporalFeaturesV1};
use crate::metrics::Metrics;
use crate::registry::{ModelArtifact, ModelRegistry, ModelSidecar};
use crate::source::{extract, EventSource};
use crate::trainer::{train_and_evaluate, GbdtClassifier};
use chrono::Utc;
use tracing::{info, instrument};

/// Result of a successful `train` run
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub artifact: ModelArtifact,
    pub metrics: Metrics,
    pub report: BuildReport,
}

/// Extract the configured window and overwrite the snapshot file.
///
/// Nothing is written when extraction fails.
#[instrument(skip_all, fields(lookback_days = config.lookback_days))]
pub async fn run_extract(
    config: &PipelineConfig,
    source: &dyn EventSource,
) -> Result<ArtifactRef, PipelineError> {
    let window = ExtractionWindow::ending_at(Utc::now(), config.lookback_days);
    let snapshot = extract(source, &window, config.extract_timeout).await?;
    let artifact = dataset::save(&snapshot, &config.dataset_path)?;
    info!(
        path = %artifact.path.display(),
        rows = artifact.rows,
        "extract finished"
    );
    Ok(artifact)
}

/// Train on the existing snapshot and publish the model with its metrics.
///
/// The registry is only touched after training and evaluation succeed, so a
/// failed run never replaces a previously published model.
#[instrument(skip_all, fields(dataset = %config.dataset_path.display()))]
pub fn run_train(config: &PipelineConfig) -> Result<TrainOutcome, PipelineError> {
    let snapshot = dataset::load(&config.dataset_path)?;
    if snapshot.is_empty() {
        return Err(InsufficientDataError {
            reason: InsufficientReason::EmptySnapshot {
                path: config.dataset_path.clone(),
            },
            examples: 0,
            positives: 0,
        }
        .into());
    }
    info!(
        rows = snapshot.row_count(),
        extracted_at = %snapshot.extracted_at,
        "loaded snapshot"
    );

    let contract = TemporalFeaturesV1;
    let (examples, report) = ExampleBuilder::new(&config.taxonomy, &contract).build(&snapshot);
    if examples.is_empty() {
        return Err(InsufficientDataError {
            reason: InsufficientReason::NoExamples {
                input_rows: report.input_rows,
                filtered_out: report.filtered_out,
                dropped_unparseable: report.dropped_unparseable,
            },
            examples: 0,
            positives: 0,
        }
        .into());
    }

    let (registry, version) = ModelRegistry::from_output_path(&config.model_output_path)?;
    let classifier = GbdtClassifier::new(config.trainer.clone());
    let trained = train_and_evaluate(
        &classifier,
        &examples,
        &config.split,
        config.allow_single_class,
    )?;

    let artifact = registry.publish(&trained.model, &trained.metrics, &contract, &version)?;
    Ok(TrainOutcome {
        artifact,
        metrics: trained.metrics,
        report,
    })
}

/// Sidecars of every version in the configured model directory
pub fn list_models(config: &PipelineConfig) -> Result<Vec<ModelSidecar>, PipelineError> {
    let (registry, _) = ModelRegistry::from_output_path(&config.model_output_path)?;
    registry
        .versions()?
        .iter()
        .map(|version| registry.load_sidecar(version).map_err(PipelineError::from))
        .collect()
}
