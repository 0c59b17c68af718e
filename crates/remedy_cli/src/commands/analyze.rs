//! Analyze command - Run every analyzer and report the issues found.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{emit, CommonArgs, Outcome};
use crate::bootstrap::{self, Unvalidated};

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Skip running the validation checks before analysis
    #[arg(long)]
    pub skip_baseline: bool,
}

pub async fn execute(args: AnalyzeArgs) -> Result<Outcome> {
    let (root, config) = args.common.load()?;
    info!("Analyzing repository: {}", root.display());

    let engine = bootstrap::build_engine(&root, &config, bootstrap::abort_on_ctrl_c(), Unvalidated::Warn)?;
    let engine = if args.skip_baseline {
        engine.without_baseline()
    } else {
        engine.establish_baseline().await.context("Failed to establish baseline")?
    };
    let analyzed = engine.analyze().await.context("Analysis failed")?;

    emit(&analyzed.report(), &args.common, None)
}
