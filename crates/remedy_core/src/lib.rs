//! # remedy_core
//!
//! Orchestration core for Remedy, a multi-agent code remediation engine.
//!
//! This crate holds the issue model, the de-duplicating issue store, risk
//! scoring, task planning, checkpoints and the typestate engine that drives
//! a run from baseline to report.
//!
//! # Architecture
//!
//! - **Analyzers**: read-only inspectors behind the [`Analyzer`] trait
//! - **Issue Store**: merges findings by `(type, file, line)`
//! - **Risk Assessor**: priority and fix risk, scored independently
//! - **Task Planner**: ordered batches of non-conflicting tasks
//! - **Checkpoints**: byte-exact snapshots restored on failure
//! - **Engine**: snapshot, apply, validate, then commit or roll back
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use remedy_core::{Engine, EngineConfig, FixRegistry};
//!
//! let engine = Engine::builder("/path/to/repo")
//!     .analyzers(my_analyzers)
//!     .fix_registry(my_registry)
//!     .validator(Arc::new(my_pipeline))
//!     .config(EngineConfig::default())
//!     .build()?;
//!
//! let complete = engine.run().await?;
//! println!("{}", complete.report().render_text());
//! ```

pub mod analyzer;
pub mod checkpoint;
pub mod context;
pub mod engine;
pub mod error;
pub mod fix;
pub mod issue;
pub mod plan;
pub mod planner;
pub mod registry;
pub mod report;
pub mod risk;
pub mod store;
pub mod task;
pub mod validation;

// Re-export main types for convenience
pub use analyzer::{run_analyzers, AnalysisResult, Analyzer, AnalyzerMetrics};
pub use checkpoint::{Checkpoint, CheckpointId, CheckpointManager};
pub use context::{AbortSignal, Metrics, RunContext};
pub use engine::{
    AnalysisConfig, Analyzed, BaselineEstablished, Complete, Engine, EngineBuilder, EngineConfig,
    EngineEvent, EventHandler, ExecutionConfig, ExecutionMode, Idle, Planned,
};
pub use error::{CoreError, CoreResult};
pub use fix::{FixHandler, FixWorkspace};
pub use issue::{Confidence, FixDescriptor, Issue, IssueId, IssueKey, Severity, ANALYSIS_INCOMPLETE};
pub use plan::{Batch, ExecutionPlan, ManualEntry, ManualReason};
pub use planner::{OrderingRule, PlannerConfig, Selector, TaskPlanner};
pub use registry::FixRegistry;
pub use report::{AnalyzerSummary, Disposition, IssueReport, RunPhase, RunReport, TaskReport};
pub use risk::{FixRisk, RiskAssessor, RiskConfig, RiskScore};
pub use store::IssueStore;
pub use task::{Task, TaskId, TaskStatus};
pub use validation::{Baseline, CheckKind, CheckOutcome, EvaluationPolicy, ValidationResult, Validator};
