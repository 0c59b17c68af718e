//! Wiring of analyzers, fix handlers and the validation pipeline into an engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use remedy_agents::{default_analyzers, default_fix_registry};
use remedy_core::{AbortSignal, CheckKind, Engine, EngineEvent, Idle, TaskStatus};

use crate::config::{ConfigError, RemedyConfig};

/// Absolute repository root, checked to exist.
pub fn resolve_root(path: &Path) -> Result<PathBuf> {
    let root = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    if !root.is_dir() {
        anyhow::bail!("Repository not found: {}", root.display());
    }
    Ok(root)
}

/// Whether fixes may be committed without any validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unvalidated {
    /// Only warn; nothing is written by the command.
    Warn,
    /// Refuse to build the engine.
    Refuse,
    /// Accept every fix, as explicitly requested.
    Allow,
}

/// Build an idle engine for `root`.
///
/// The pipeline's type check, when there is one, also feeds the type
/// diagnostics analyzer.
pub fn build_engine(
    root: &Path,
    config: &RemedyConfig,
    abort: AbortSignal,
    unvalidated: Unvalidated,
) -> Result<Engine<Idle>> {
    let pipeline = config
        .validation
        .build(root)
        .context("Failed to build validation pipeline")?;
    if pipeline.is_empty() {
        match unvalidated {
            Unvalidated::Refuse => {
                return Err(ConfigError::Invalid(
                    "no validation checks configured or detected; add checks under `validation` \
                     or pass --allow-unvalidated"
                        .to_string(),
                )
                .into())
            }
            Unvalidated::Allow => warn!("⚠️ No validation checks; every applied fix will be committed"),
            Unvalidated::Warn => warn!("No validation checks configured or detected"),
        }
    }

    let type_provider = pipeline
        .checks()
        .iter()
        .find(|check| check.provider().kind() == CheckKind::TypeCheck)
        .map(|check| Arc::clone(check.provider()));

    let analyzers = default_analyzers(type_provider).context("Failed to create analyzers")?;
    info!(
        "🔧 {} analyzer(s), {} validation check(s)",
        analyzers.len(),
        pipeline.len()
    );

    Engine::builder(root)
        .analyzers(analyzers)
        .fix_registry(default_fix_registry())
        .validator(Arc::new(pipeline))
        .config(config.engine.clone())
        .abort_signal(abort)
        .on_event(log_event)
        .build()
        .context("Failed to create engine")
}

/// Abort the run on Ctrl-C. The current task finishes first.
pub fn abort_on_ctrl_c() -> AbortSignal {
    let abort = AbortSignal::new();
    let signal = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⏸️ Interrupt received, stopping after the current task");
            signal.abort();
        }
    });
    abort
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::PhaseStarted { phase } => info!("▶️ {:?}", phase),
        EngineEvent::AnalyzerFinished {
            analyzer,
            issues,
            degraded,
        } => {
            if *degraded {
                warn!("⚠️ {} finished degraded with {} issue(s)", analyzer, issues);
            } else {
                info!("🔎 {}: {} issue(s)", analyzer, issues);
            }
        }
        EngineEvent::PlanReady {
            batches,
            tasks,
            manual,
        } => info!("📋 Plan: {} task(s) in {} batch(es), {} manual-only", tasks, batches, manual),
        EngineEvent::BatchStarted { index, tasks } => info!("📦 Batch {} ({} task(s))", index + 1, tasks),
        EngineEvent::TaskStarted { task } => info!("🛠️ {}", task.as_str()),
        EngineEvent::TaskFinished { task, status } => match status {
            TaskStatus::Committed => info!("✅ {} committed", task.as_str()),
            other => warn!("↩️ {} {}", task.as_str(), other.as_str()),
        },
        EngineEvent::Aborted { remaining } => warn!("⏸️ Aborted with {} task(s) not attempted", remaining),
        EngineEvent::Completed {
            fixed,
            rolled_back,
            failed,
        } => info!(
            "🏁 Done: {} fixed, {} rolled back, {} failed",
            fixed, rolled_back, failed
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_pipeline_refused_unless_allowed() {
        let dir = tempdir().unwrap();
        let config = RemedyConfig::default();

        let Err(err) = build_engine(dir.path(), &config, AbortSignal::new(), Unvalidated::Refuse) else {
            panic!("empty pipeline accepted");
        };
        assert!(err.chain().any(|c| matches!(c.downcast_ref::<ConfigError>(), Some(ConfigError::Invalid(_)))));

        assert!(build_engine(dir.path(), &config, AbortSignal::new(), Unvalidated::Allow).is_ok());
        assert!(build_engine(dir.path(), &config, AbortSignal::new(), Unvalidated::Warn).is_ok());
    }
}
