//! Label and feature construction
//!
//! Snapshot rows → taxonomy filter → label lookup → versioned feature
//! contract. Derivation is a pure per-record function, so rows are
//! processed in parallel while output order follows input order.

use crate::event::{DatasetSnapshot, EventRecord};
use crate::taxonomy::EventTaxonomy;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Timelike};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Why a single record could not be turned into features
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    #[error("unparseable created_at '{0}'")]
    UnparseableTimestamp(String),
}

/// Versioned, deterministic mapping from an event record to its feature vector.
///
/// The version is persisted next to every trained model; scoring must use a
/// contract with the same version.
pub trait FeatureContract: Send + Sync {
    fn version(&self) -> &'static str;

    fn feature_names(&self) -> &'static [&'static str];

    fn derive(&self, record: &EventRecord) -> Result<Vec<f64>, FeatureError>;
}

/// V1 contract: hour of day and day of week of `created_at`.
///
/// Both are read in the offset the timestamp was written with. Day of
/// week counts from Sunday = 0 to Saturday = 6.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalFeaturesV1;

impl TemporalFeaturesV1 {
    pub const VERSION: &'static str = "temporal-v1";
    pub const FEATURES: [&'static str; 2] = ["hour_of_day", "day_of_week"];
}

impl FeatureContract for TemporalFeaturesV1 {
    fn version(&self) -> &'static str {
        Self::VERSION
    }

    fn feature_names(&self) -> &'static [&'static str] {
        &Self::FEATURES
    }

    fn derive(&self, record: &EventRecord) -> Result<Vec<f64>, FeatureError> {
        let local = parse_created_at(&record.created_at)
            .ok_or_else(|| FeatureError::UnparseableTimestamp(record.created_at.clone()))?;
        Ok(vec![
            f64::from(local.hour()),
            f64::from(local.weekday().num_days_from_sunday()),
        ])
    }
}

/// Parse `created_at` into its local wall-clock time.
///
/// Accepts RFC 3339, Postgres/pandas text (`2024-01-01 10:00:00.5+00`), and
/// naive timestamps with either `T` or a space as separator.
pub fn parse_created_at(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_local());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::<FixedOffset>::parse_from_str(raw, format) {
            return Some(ts.naive_local());
        }
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

/// One (features, label) pair derived from a qualifying event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub event_id: String,
    pub features: Vec<f64>,
    /// 1 for a conversion, 0 otherwise
    pub label: u8,
}

/// Row accounting for one build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub input_rows: usize,
    pub filtered_out: usize,
    pub dropped_unparseable: usize,
    pub examples: usize,
    pub positives: usize,
}

/// Applies the taxonomy policy and a feature contract to snapshot rows.
pub struct ExampleBuilder<'a> {
    taxonomy: &'a EventTaxonomy,
    contract: &'a dyn FeatureContract,
}

enum RowOutcome {
    Filtered,
    Unparseable,
    Example(TrainingExample),
}

impl<'a> ExampleBuilder<'a> {
    pub fn new(taxonomy: &'a EventTaxonomy, contract: &'a dyn FeatureContract) -> Self {
        Self { taxonomy, contract }
    }

    pub fn contract(&self) -> &dyn FeatureContract {
        self.contract
    }

    /// Build examples for every relevant, parseable record.
    ///
    /// An empty result is not an error; the split stage decides whether
    /// there is enough to train on.
    pub fn build(&self, snapshot: &DatasetSnapshot) -> (Vec<TrainingExample>, BuildReport) {
        let outcomes: Vec<RowOutcome> = snapshot
            .records
            .par_iter()
            .map(|record| self.build_one(record))
            .collect();

        let mut report = BuildReport {
            input_rows: snapshot.row_count(),
            ..BuildReport::default()
        };
        let mut examples = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                RowOutcome::Filtered => report.filtered_out += 1,
                RowOutcome::Unparseable => report.dropped_unparseable += 1,
                RowOutcome::Example(example) => {
                    report.positives += usize::from(example.label);
                    examples.push(example);
                }
            }
        }
        report.examples = examples.len();

        if report.dropped_unparseable > 0 {
            warn!(
                dropped = report.dropped_unparseable,
                input_rows = report.input_rows,
                "dropped rows with unparseable created_at"
            );
        }
        info!(
            input_rows = report.input_rows,
            filtered_out = report.filtered_out,
            examples = report.examples,
            positives = report.positives,
            contract = self.contract.version(),
            "built training examples"
        );

        (examples, report)
    }

    fn build_one(&self, record: &EventRecord) -> RowOutcome {
        let Some(label) = self.taxonomy.label_for(&record.event_type) else {
            return RowOutcome::Filtered;
        };
        match self.contract.derive(record) {
            Ok(features) => RowOutcome::Example(TrainingExample {
                event_id: record.id.clone(),
                features,
                label,
            }),
            Err(FeatureError::UnparseableTimestamp(_)) => RowOutcome::Unparseable,
        }
    }
}
