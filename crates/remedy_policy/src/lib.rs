//! # remedy_policy
//!
//! Validation for Remedy: the ordered battery of checks every applied fix
//! must survive before it is committed.
//!
//! This crate provides:
//! - **Diagnostic Providers**: pluggable sources of check results and diagnostics
//! - **Command Providers**: external tools with regex-parsed output
//! - **Validation Pipeline**: ordered, timeout-bounded, fail-fast checks
//! - **Pipeline Config**: YAML/TOML configuration and build-file detection
//!
//! ## Example
//!
//! ```rust,ignore
//! use remedy_policy::PipelineConfig;
//! use remedy_core::Baseline;
//!
//! let config = PipelineConfig::from_file(Path::new("remedy.yaml"))?;
//! let pipeline = config.build(Path::new("./my-app"))?;
//! let result = pipeline.run(Path::new("./my-app"), &Baseline::empty()).await;
//!
//! if result.passed {
//!     println!("✅ Validation passed");
//! } else {
//!     println!("❌ {}", result.summary());
//! }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod mock;
pub mod pipeline;
pub mod provider;

pub use command::{CommandOutput, CommandProvider, CommandSpec, DiagnosticPattern, ProcessRunner, ToolRunner};
pub use config::{detect, CheckConfig, ParserConfig, PipelineConfig};
pub use error::{PolicyError, PolicyResult};
pub use mock::{MockProvider, MockResponse};
pub use pipeline::{PipelineCheck, ValidationPipeline};
pub use provider::{DiagnosticProvider, DiagnosticReport};
