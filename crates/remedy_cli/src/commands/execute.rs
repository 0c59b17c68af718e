//! Execute command - Apply planned fixes behind checkpoints.
//!
//! Every task is validated against the baseline before it is committed. A
//! failed restore aborts the run with a dedicated exit code.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::info;

use remedy_core::ExecutionMode;

use super::{emit, CommonArgs, Outcome};
use crate::bootstrap::{self, Unvalidated};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Validate after each task
    Sequential,
    /// Apply a whole batch, then validate once
    Batched,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => ExecutionMode::Sequential,
            ModeArg::Batched => ExecutionMode::Batched,
        }
    }
}

#[derive(Args, Debug)]
pub struct ExecuteArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Override the configured execution mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Commit fixes even when no validation check is configured or detected
    #[arg(long)]
    pub allow_unvalidated: bool,
}

pub async fn execute(args: ExecuteArgs) -> Result<Outcome> {
    let (root, mut config) = args.common.load()?;
    if let Some(mode) = args.mode {
        config.engine.execution.mode = mode.into();
    }
    info!(
        "Remediating {} ({:?} mode)",
        root.display(),
        config.engine.execution.mode
    );

    let unvalidated = if args.allow_unvalidated {
        Unvalidated::Allow
    } else {
        Unvalidated::Refuse
    };
    let engine = bootstrap::build_engine(&root, &config, bootstrap::abort_on_ctrl_c(), unvalidated)?;
    let complete = engine.run().await.context("Remediation run failed")?;

    emit(complete.report(), &args.common, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_conversion() {
        assert_eq!(ExecutionMode::from(ModeArg::Batched), ExecutionMode::Batched);
        assert_eq!(ExecutionMode::from(ModeArg::Sequential), ExecutionMode::Sequential);
    }
}
