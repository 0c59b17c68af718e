//! Plan command - Analyze and print the execution plan without applying it.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{emit, CommonArgs, Outcome};
use crate::bootstrap::{self, Unvalidated};

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Skip running the validation checks before analysis
    #[arg(long)]
    pub skip_baseline: bool,
}

pub async fn execute(args: PlanArgs) -> Result<Outcome> {
    let (root, config) = args.common.load()?;
    info!("Planning remediation for: {}", root.display());

    let engine = bootstrap::build_engine(&root, &config, bootstrap::abort_on_ctrl_c(), Unvalidated::Warn)?;
    let engine = if args.skip_baseline {
        engine.without_baseline()
    } else {
        engine.establish_baseline().await.context("Failed to establish baseline")?
    };
    let planned = engine
        .analyze()
        .await
        .context("Analysis failed")?
        .plan()
        .context("Planning failed")?;

    let outline = format!("Execution plan: {}", planned.execution_plan().outline());
    emit(&planned.report(), &args.common, Some(&outline))
}
