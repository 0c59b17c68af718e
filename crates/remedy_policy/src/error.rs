//! Error types for the validation pipeline.

use thiserror::Error;

/// Result type alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors that can occur while running validation checks.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Provider failed: {provider} - {message}")]
    ProviderFailed { provider: String, message: String },

    #[error("Command failed to start: {command} - {message}")]
    CommandFailed { command: String, message: String },

    #[error("Invalid validation configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid diagnostic pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<PolicyError> for remedy_core::CoreError {
    fn from(err: PolicyError) -> Self {
        remedy_core::CoreError::Validation(err.to_string())
    }
}
