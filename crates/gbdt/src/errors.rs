use thiserror::Error;

/// Errors returned by the GBDT trainer and model.
#[derive(Debug, Error)]
pub enum GbdtError {
    #[error("training set is empty")]
    EmptyDataset,

    #[error("row {row}: expected {expected} features, got {got}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("{features} feature rows but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },

    #[error("row {row}: label {label} is not 0 or 1")]
    InvalidLabel { row: usize, label: u8 },

    #[error("row {row}, feature {feature}: value is not finite")]
    NonFiniteFeature { row: usize, feature: usize },

    #[error("invalid training parameters: {0}")]
    InvalidParams(String),

    #[error("model validation failed: {0}")]
    Validation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
