//! `remedy.yaml` loading.
//!
//! Engine sections (`analysis`, `risk`, `planner`, `execution`) sit at the
//! top level next to a `validation` section for the check battery.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use remedy_agents::AnalyzerKind;
use remedy_core::EngineConfig;
use remedy_policy::PipelineConfig;

/// File names looked up at the repository root, in order.
pub const CONFIG_FILES: &[&str] = &["remedy.yaml", "remedy.yml", "remedy.toml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported config format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Whole-run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemedyConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,
    pub validation: PipelineConfig,
}

impl RemedyConfig {
    /// Load from `explicit`, or the first config file found under `root`,
    /// or fall back to defaults.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => CONFIG_FILES.iter().map(|name| root.join(name)).find(|p| p.is_file()),
        };

        let config = match path {
            Some(path) => {
                info!("📄 Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                debug!("No configuration file under {}, using defaults", root.display());
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string())),
            Some("toml") => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Reject values the engine or pipeline would refuse later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.validation
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        for name in &self.engine.analysis.disabled {
            name.parse::<AnalyzerKind>()
                .map_err(|_| ConfigError::Invalid(format!("unknown analyzer in analysis.disabled: {}", name)))?;
        }
        Ok(())
    }

    /// Add analyzers named on the command line to the disabled set.
    pub fn disable(&mut self, names: &[String]) -> Result<(), ConfigError> {
        for name in names {
            let kind: AnalyzerKind = name
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("unknown analyzer: {}", name)))?;
            self.engine.analysis.disabled.insert(kind.as_str().to_string());
        }
        Ok(())
    }
}
