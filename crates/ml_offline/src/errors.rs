//! Error taxonomy for the offline pipeline
//!
//! Each stage fails with its own error type; [`PipelineError`] aggregates
//! them for the CLI, which maps every variant to a distinct exit code.

use crate::event::ExtractionWindow;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Invalid or unreadable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("configuration file {} not found", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Failure to read events from the store
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("invalid extraction window: lookback_days must be > 0, got {lookback_days}")]
    InvalidWindow { lookback_days: i64 },

    #[error("could not connect to event store at {host}:{port}/{database}: {source}")]
    Connect {
        host: String,
        port: u16,
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("event query failed for window {window}: {source}")]
    Query {
        window: ExtractionWindow,
        #[source]
        source: sqlx::Error,
    },

    #[error("extraction for window {window} timed out after {}s", .after.as_secs())]
    Timeout {
        window: ExtractionWindow,
        after: Duration,
    },
}

/// I/O or encoding failure reading or writing an artifact
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("artifact not found at {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{} is missing required columns: {}", .path.display(), .missing.join(", "))]
    Schema { path: PathBuf, missing: Vec<String> },

    #[error("failed to encode artifact {}: {reason}", .path.display())]
    Serialize { path: PathBuf, reason: String },

    #[error("artifact {} is inconsistent with its sidecar: {reason}", .path.display())]
    Inconsistent { path: PathBuf, reason: String },

    #[error("invalid model version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound { path };
        }
        Self::Io { path, source }
    }
}

/// Why a training run had nothing usable to learn from
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsufficientReason {
    /// The dataset snapshot has no rows at all
    #[error("dataset snapshot {} is empty; extract a longer window or wait for more events", .path.display())]
    EmptySnapshot { path: PathBuf },

    /// Rows exist but none survived the taxonomy filter and timestamp parsing
    #[error(
        "no training examples from {input_rows} snapshot rows ({filtered_out} outside \
         RELEVANT_EVENT_TYPES, {dropped_unparseable} with unparseable created_at)"
    )]
    NoExamples {
        input_rows: usize,
        filtered_out: usize,
        dropped_unparseable: usize,
    },

    /// The trainer was handed an empty example set
    #[error("no training examples were supplied")]
    EmptyInput,

    /// Only one label class is present
    #[error(
        "only one label class present; AUC is undefined until both conversions \
         and non-conversions are logged"
    )]
    SingleClass,

    /// Too few examples to hold out an evaluation split
    #[error("too few examples to hold out an evaluation split; at least 2 are required")]
    TooFewExamples,
}

/// Expected "not enough data yet" condition; not a crash
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} ({examples} examples, {positives} positive)")]
pub struct InsufficientDataError {
    pub reason: InsufficientReason,
    pub examples: usize,
    pub positives: usize,
}

/// Trainer capability failure that is not a data-volume problem
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("classifier fit failed: {0}")]
    Fit(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

/// Top-level error for CLI commands
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    InsufficientData(#[from] InsufficientDataError),

    #[error(transparent)]
    Training(#[from] TrainingError),
}

impl PipelineError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Config(_) | PipelineError::Training(_) => 1,
            PipelineError::Extraction(_) => 2,
            PipelineError::Persistence(PersistenceError::NotFound { .. }) => 4,
            PipelineError::Persistence(_) => 3,
            PipelineError::InsufficientData(_) => 5,
        }
    }
}
