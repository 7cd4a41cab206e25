//! Error types for gazeqc

use thiserror::Error;

/// Errors that can occur while scoring, training or loading models
#[derive(Debug, Error)]
pub enum QualityError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient data: at least {required} samples required, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Model artifact error: {0}")]
    ArtifactError(String),

    #[error("Incompatible model artifact: expected {expected}, got {actual}")]
    IncompatibleArtifact { expected: String, actual: String },

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Another training run holds the lock at {0}")]
    TrainingInProgress(String),

    #[error("Training cancelled after {epochs_completed} epochs")]
    Cancelled { epochs_completed: usize },

    #[error("Test record not found: {0}")]
    RecordNotFound(String),
}
