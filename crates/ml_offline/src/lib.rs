//! Gathr offline ML pipeline
//!
//! Extracts a window of behavioral events from Postgres into a CSV
//! snapshot, derives labelled training examples from it, trains a gradient
//! boosted tree classifier predicting whether a plan view converts into a
//! join, and publishes the model with its evaluation metrics.

pub mod config;
pub mod dataset;
pub mod errors;
pub mod event;
pub mod features;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod split;
pub mod taxonomy;
pub mod trainer;

pub use config::{DatabaseConfig, LogConfig, LogFormat, PipelineConfig, SplitConfig};
pub use dataset::ArtifactRef;
pub use errors::{
    ConfigError, ExtractionError, InsufficientDataError, InsufficientReason, PersistenceError,
    PipelineError, TrainingError,
};
pub use event::{non_empty_metadata, DatasetSnapshot, EventRecord, ExtractionWindow};
pub use features::{BuildReport, ExampleBuilder, FeatureContract, TemporalFeaturesV1, TrainingExample};
pub use metrics::Metrics;
pub use pipeline::{list_models, run_extract, run_train, TrainOutcome};
pub use registry::{ModelArtifact, ModelRegistry, ModelSidecar, PublishedModel};
pub use source::{extract, EventRow, EventSource, PgEventSource};
pub use taxonomy::EventTaxonomy;
pub use trainer::{train_and_evaluate, Classifier, GbdtClassifier, ScoringModel, TrainedModel};
