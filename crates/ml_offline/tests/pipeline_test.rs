//! End-to-end runs of the extract and train commands against temp dirs

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use gathr_ml_offline::{
    dataset, run_extract, run_train, DatasetSnapshot, EventRecord, EventRow, EventSource,
    EventTaxonomy, ExampleBuilder, ExtractionError, ExtractionWindow, InsufficientReason,
    ModelRegistry, PipelineConfig, PipelineError, TemporalFeaturesV1,
};
use gathr_gbdt::{GbdtParams, Model};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn config_in(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        dataset_path: dir.join("data/event_logs.csv"),
        model_output_path: dir.join("models/xgboost_v1.json"),
        trainer: GbdtParams {
            num_trees: 15,
            max_depth: 3,
            ..GbdtParams::default()
        },
        ..PipelineConfig::default()
    }
}

fn record(id: usize, event_type: &str, created_at: String) -> EventRecord {
    EventRecord {
        id: format!("evt-{id}"),
        user_id: Some((id % 13) as i64),
        activity_id: Some((id % 5) as i64),
        event_type: event_type.to_string(),
        metadata: Some(format!(r#"{{"n":{id}}}"#)),
        created_at,
    }
}

/// Views in the morning, joins in the evening, spread over two weeks.
fn mixed_records(n: usize) -> Vec<EventRecord> {
    (0..n)
        .map(|i| {
            let (event_type, hour) = match i % 3 {
                0 => ("PLAN_JOINED", 18 + (i % 4) as u32),
                1 => ("PLAN_CONFIRMED", 19 + (i % 3) as u32),
                _ => ("PLAN_VIEWED", 7 + (i % 4) as u32),
            };
            let day = 1 + (i % 14) as u32;
            let ts = Utc.with_ymd_and_hms(2024, 3, day, hour, 15, 0).unwrap();
            record(i, event_type, ts.to_rfc3339())
        })
        .collect()
}

fn write_snapshot(config: &PipelineConfig, records: Vec<EventRecord>) -> Result<()> {
    dataset::save(&DatasetSnapshot::new(records, Utc::now()), &config.dataset_path)?;
    Ok(())
}

#[test]
fn scenario_a_view_and_join_at_same_time() -> Result<()> {
    let taxonomy = EventTaxonomy::new(["VIEWED", "JOINED", "CONFIRMED"], ["JOINED", "CONFIRMED"])
        .map_err(anyhow::Error::msg)?;
    let snapshot = DatasetSnapshot::new(
        vec![
            record(1, "VIEWED", "2024-01-01T10:00:00".to_string()),
            record(2, "JOINED", "2024-01-01T10:00:00".to_string()),
        ],
        Utc::now(),
    );

    let (examples, report) = ExampleBuilder::new(&taxonomy, &TemporalFeaturesV1).build(&snapshot);

    assert_eq!(report.examples, 2);
    let labels: Vec<u8> = examples.iter().map(|e| e.label).collect();
    assert_eq!(labels, vec![0, 1]);
    assert_eq!(examples[0].features, vec![10.0, 1.0]);
    assert_eq!(examples[1].features, vec![10.0, 1.0]);
    Ok(())
}

#[test]
fn scenario_b_empty_snapshot_fails_without_touching_models() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config_in(dir.path());

    write_snapshot(&config, Vec::new())?;
    let err = run_train(&config).unwrap_err();
    assert_eq!(err.exit_code(), 5);
    assert!(matches!(
        err,
        PipelineError::InsufficientData(ref e)
            if matches!(e.reason, InsufficientReason::EmptySnapshot { .. })
    ));
    assert!(err.to_string().contains("event_logs.csv"));
    assert!(!config.model_output_path.exists());

    // A previously published model survives a later empty run.
    write_snapshot(&config, mixed_records(60))?;
    run_train(&config)?;
    let before = fs::read(&config.model_output_path)?;

    write_snapshot(&config, Vec::new())?;
    assert!(run_train(&config).is_err());
    assert_eq!(fs::read(&config.model_output_path)?, before);
    Ok(())
}

#[test]
fn scenario_c_views_only() -> Result<()> {
    let dir = TempDir::new()?;
    let records: Vec<EventRecord> = (0..30)
        .map(|i| {
            let ts = Utc.with_ymd_and_hms(2024, 1, 1 + (i % 20) as u32, (i % 24) as u32, 0, 0)
                .unwrap();
            record(i, "PLAN_VIEWED", ts.to_rfc3339())
        })
        .collect();

    let strict = config_in(dir.path());
    write_snapshot(&strict, records)?;
    let err = run_train(&strict).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InsufficientData(ref e) if e.reason == InsufficientReason::SingleClass
    ));

    let permissive = PipelineConfig {
        allow_single_class: true,
        ..config_in(dir.path())
    };
    let outcome = run_train(&permissive)?;
    assert_eq!(outcome.report.positives, 0);
    assert_eq!(outcome.metrics.auc, 0.5);
    assert!(outcome.metrics.auc_degenerate);
    assert!(outcome.artifact.model_path.is_file());
    Ok(())
}

#[test]
fn filtered_out_snapshot_reports_row_counts() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config_in(dir.path());
    let mut records: Vec<EventRecord> = (0..5)
        .map(|i| record(i, "PLAN_DELETED", "2024-03-01T10:00:00Z".to_string()))
        .collect();
    records.push(record(5, "PLAN_VIEWED", "yesterday".to_string()));
    write_snapshot(&config, records)?;

    let err = run_train(&config).unwrap_err();
    assert_eq!(err.exit_code(), 5);
    match err {
        PipelineError::InsufficientData(e) => assert_eq!(
            e.reason,
            InsufficientReason::NoExamples {
                input_rows: 6,
                filtered_out: 5,
                dropped_unparseable: 1,
            }
        ),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!config.model_output_path.exists());
    Ok(())
}

#[test]
fn missing_snapshot_is_its_own_failure() -> Result<()> {
    let dir = TempDir::new()?;
    let err = run_train(&config_in(dir.path())).unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("event_logs.csv"));
    Ok(())
}

#[test]
fn train_publishes_a_scorable_model_with_sidecar() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config_in(dir.path());
    write_snapshot(&config, mixed_records(90))?;

    let outcome = run_train(&config)?;
    assert_eq!(outcome.report.examples, 90);
    assert_eq!(outcome.metrics.eval_rows, 18);
    assert!(outcome.metrics.accuracy > 0.9);

    let (registry, version) = ModelRegistry::from_output_path(&config.model_output_path)?;
    assert_eq!(version, "xgboost_v1");
    let published = registry.load(&version)?;
    assert_eq!(published.sidecar.feature_contract_version, "temporal-v1");
    assert_eq!(published.sidecar.metrics, outcome.metrics);

    let model = Model::from_json_slice(&published.bytes)?;
    let evening = model.predict_proba(&[19.0, 3.0]);
    let morning = model.predict_proba(&[8.0, 3.0]);
    assert!(evening > 0.5 && morning < 0.5, "{evening} vs {morning}");
    Ok(())
}

#[test]
fn retraining_is_reproducible() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config_in(dir.path());
    write_snapshot(&config, mixed_records(45))?;

    let first = run_train(&config)?;
    let first_bytes = fs::read(&config.model_output_path)?;
    let second = run_train(&config)?;

    assert_eq!(first.metrics, second.metrics);
    assert_eq!(first.artifact.model_blake3, second.artifact.model_blake3);
    assert_eq!(fs::read(&config.model_output_path)?, first_bytes);
    Ok(())
}

struct RecentEvents;

#[async_trait]
impl EventSource for RecentEvents {
    async fn fetch(&self, window: &ExtractionWindow) -> Result<Vec<EventRow>, ExtractionError> {
        Ok((0..40)
            .map(|i| {
                let joined = i % 2 == 0;
                let hours_ago = if joined { 3 + 24 * (i % 10) } else { 12 + 24 * (i % 10) };
                EventRow {
                    id: format!("{i:08}"),
                    user_id: Some(i),
                    activity_id: Some(i % 4),
                    event_type: if joined { "PLAN_JOINED" } else { "PLAN_VIEWED" }.to_string(),
                    metadata: None,
                    created_at: window.end - Duration::hours(hours_ago),
                }
            })
            .collect())
    }
}

struct Unreachable;

#[async_trait]
impl EventSource for Unreachable {
    async fn fetch(&self, _window: &ExtractionWindow) -> Result<Vec<EventRow>, ExtractionError> {
        Err(ExtractionError::InvalidWindow { lookback_days: -1 })
    }
}

#[tokio::test]
async fn extract_then_train() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config_in(dir.path());

    let artifact = run_extract(&config, &RecentEvents).await?;
    assert_eq!(artifact.rows, 40);

    let snapshot = dataset::load(&config.dataset_path)?;
    assert_eq!(snapshot.row_count(), 40);
    assert!(snapshot.records.iter().all(|r| r.metadata.is_none()));

    let outcome = run_train(&config)?;
    assert_eq!(outcome.report.positives, 20);
    assert!(outcome.artifact.sidecar_path.is_file());
    Ok(())
}

#[tokio::test]
async fn failed_extract_writes_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config_in(dir.path());

    let err = run_extract(&config, &Unreachable).await.unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(!config.dataset_path.exists());
    Ok(())
}
