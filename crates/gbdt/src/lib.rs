//! Gathr GBDT - deterministic gradient boosted decision tree classifier
//!
//! Trains binary classifiers with a logistic objective and exposes
//! probability scoring. Training is fully reproducible: the same rows in
//! the same order with the same parameters always produce byte-identical
//! canonical JSON.

pub mod cart;
pub mod deterministic;
pub mod errors;
pub mod model;
pub mod serialization;
pub mod trainer;
pub mod tree;

pub use deterministic::{LcgRng, SplitTieBreaker};
pub use errors::GbdtError;
pub use model::{sigmoid, Model, OBJECTIVE_BINARY_LOGISTIC};
pub use trainer::{GbdtParams, GbdtTrainer};
pub use tree::{Node, Tree};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
