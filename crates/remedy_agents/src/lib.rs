//! # remedy_agents
//!
//! Built-in analyzers and fix handlers for Remedy.
//!
//! Analyzers only read the repository; fix handlers only write through the
//! task's [`remedy_core::FixWorkspace`].
//!
//! ## Available Analyzers
//!
//! | Analyzer | Name | Auto-fixable findings |
//! |----------|------|-----------------------|
//! | [`SecurityAnalyzer`] | `security` | none |
//! | [`PerformanceAnalyzer`] | `performance` | `missing_lazy_loading` |
//! | [`A11yAnalyzer`] | `accessibility` | `missing_alt_text`, `missing_document_language` |
//! | [`DependencyAnalyzer`] | `dependency` | `unpinned_dependency` (manual: manifests are high fix risk) |
//! | [`TestQualityAnalyzer`] | `test-quality` | `focused_test` |
//! | [`CodeQualityAnalyzer`] | `code-quality` | `console_log_statement`, `debugger_statement` |
//! | [`DeploymentAnalyzer`] | `deployment` | none |
//! | [`TypeDiagnosticsAnalyzer`] | `types` | none |

pub mod a11y;
pub mod dependency;
pub mod deployment;
pub mod diagnostics;
pub mod error;
pub mod fixes;
pub mod performance;
pub mod quality;
pub mod roles;
pub mod scan;
pub mod security;

pub use a11y::A11yAnalyzer;
pub use dependency::DependencyAnalyzer;
pub use deployment::DeploymentAnalyzer;
pub use diagnostics::TypeDiagnosticsAnalyzer;
pub use error::{AgentError, AgentResult};
pub use fixes::{InsertAttributeFix, PinDependencyFix, RemoveLineFix, ReplaceTextFix};
pub use performance::PerformanceAnalyzer;
pub use quality::{CodeQualityAnalyzer, TestQualityAnalyzer};
pub use roles::{default_analyzers, default_fix_registry, AnalyzerKind};
pub use security::SecurityAnalyzer;
