//! Error types for the valuator

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ValuatorError>;

#[derive(Error, Debug)]
pub enum ValuatorError {
    /// Missing column, empty dataset or an unusable training row
    #[error("Data error: {0}")]
    Data(String),

    /// Bundle file absent or unreadable; the caller should (re)train
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Input record too incomplete (or mistyped) for a meaningful prediction
    #[error("Feature mismatch: {0}")]
    FeatureMismatch(String),

    #[error("Computation failed for {record}: {reason}")]
    Computation { record: String, reason: String },

    #[error("Training cancelled after {trees_built} trees")]
    Cancelled { trees_built: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl ValuatorError {
    /// True when the caller should prompt for training instead of failing hard
    pub fn needs_training(&self) -> bool {
        matches!(self, ValuatorError::ModelNotAvailable(_))
    }
}
