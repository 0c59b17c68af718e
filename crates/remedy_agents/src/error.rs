//! Error types for analyzers and fix handlers.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur while scanning or fixing.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to walk {path}: {message}")]
    Walk { path: PathBuf, message: String },

    #[error("Failed to parse {file}: {message}")]
    Parse { file: PathBuf, message: String },

    #[error("Fix could not be applied by {handler}: {message}")]
    FixRejected { handler: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Core error: {0}")]
    Core(#[from] remedy_core::CoreError),
}

impl AgentError {
    pub fn parse(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn fix_rejected(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FixRejected {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

impl From<walkdir::Error> for AgentError {
    fn from(err: walkdir::Error) -> Self {
        Self::Walk {
            path: err.path().map(|p| p.to_path_buf()).unwrap_or_default(),
            message: err.to_string(),
        }
    }
}

impl From<AgentError> for remedy_core::CoreError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Core(core) => core,
            AgentError::FixRejected { handler, message } => remedy_core::CoreError::FixFailed { handler, message },
            AgentError::Io(io) => remedy_core::CoreError::Io(io),
            other => remedy_core::CoreError::AnalyzerFailed {
                analyzer: "agents".to_string(),
                message: other.to_string(),
            },
        }
    }
}
