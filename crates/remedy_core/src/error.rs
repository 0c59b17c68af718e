//! Error types for the core module.

use std::path::PathBuf;

use thiserror::Error;

use crate::task::TaskStatus;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Analyzer failed: {analyzer} - {message}")]
    AnalyzerFailed { analyzer: String, message: String },

    #[error("No fix handler registered for issue type: {0}")]
    HandlerNotFound(String),

    #[error("Fix application failed: {handler} - {message}")]
    FixFailed { handler: String, message: String },

    #[error("Path is outside the task footprint: {}", .0.display())]
    OutsideFootprint(PathBuf),

    #[error("Invalid task transition for {task}: {from} -> {to}")]
    InvalidTransition {
        task: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Issue not found: {0}")]
    IssueNotFound(String),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Snapshot failed: {0}")]
    SnapshotFailed(String),

    /// Restoring a checkpoint failed. The repository may be in an unknown
    /// state, so the run must halt.
    #[error("Checkpoint restore failed: {checkpoint} - {message}")]
    RestoreFailed { checkpoint: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Create a fix failure for the named handler.
    pub fn fix_failed(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FixFailed {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Whether this error must stop the run instead of failing a single task.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RestoreFailed { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
