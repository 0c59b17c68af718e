//! CLI command definitions.
//!
//! Each subcommand stops the engine at a different phase: `analyze` after
//! analysis, `plan` after planning, `execute` after the full run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use remedy_core::RunReport;

use crate::bootstrap;
use crate::config::RemedyConfig;

pub mod analyze;
pub mod execute;
pub mod plan;

/// Remedy - multi-agent code remediation
#[derive(Parser, Debug)]
#[command(name = "remedy")]
#[command(version, about = "Remedy - multi-agent code remediation")]
#[command(long_about = r#"
Remedy runs a set of analyzers over a repository, plans fixes for what they
find, and applies each fix behind a checkpoint. A fix is kept only when the
validation checks still pass and no new diagnostic appears.

WORKFLOWS:
  analyze  → Run analyzers and report issues
  plan     → Analyze, then show the execution plan
  execute  → Analyze, plan, apply and validate fixes

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Unresolved high or critical issues
  4 - Checkpoint restore failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run analyzers and report issues
    Analyze(analyze::AnalyzeArgs),

    /// Analyze and show the execution plan without changing files
    Plan(plan::PlanArgs),

    /// Apply fixes behind checkpoints and validate each one
    Execute(execute::ExecuteArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to the repository
    #[arg(short, long, default_value = ".")]
    pub path: PathBuf,

    /// Configuration file (defaults to remedy.yaml at the repository root)
    #[arg(short, long, env = "REMEDY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write the JSON report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Analyzers to skip (repeatable)
    #[arg(long = "disable", value_name = "ANALYZER")]
    pub disabled: Vec<String>,
}

impl CommonArgs {
    /// Repository root and its configuration, with command-line overrides.
    pub fn load(&self) -> Result<(PathBuf, RemedyConfig)> {
        let root = bootstrap::resolve_root(&self.path)?;
        let mut config =
            RemedyConfig::load(&root, self.config.as_deref()).context("Failed to load configuration")?;
        config.disable(&self.disabled)?;
        Ok((root, config))
    }
}

/// How a command finished, mapped to an exit code in `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Clean,
    UnresolvedBlocking,
}

impl Outcome {
    pub fn of(report: &RunReport) -> Self {
        if report.has_unresolved_blocking() {
            Outcome::UnresolvedBlocking
        } else {
            Outcome::Clean
        }
    }
}

/// Print the report and save it when asked to.
pub fn emit(report: &RunReport, args: &CommonArgs, preamble: Option<&str>) -> Result<Outcome> {
    if let Some(path) = &args.output {
        save(report, path)?;
    }

    match args.format {
        OutputFormat::Json => println!("{}", report.to_json().context("Failed to serialize report")?),
        OutputFormat::Text => {
            if let Some(preamble) = preamble {
                println!("{}", preamble);
            }
            println!("{}", report.render_text());
        }
    }

    let outcome = Outcome::of(report);
    if args.format == OutputFormat::Text {
        println!();
        match outcome {
            Outcome::Clean => println!("✅ No unresolved high or critical issues"),
            Outcome::UnresolvedBlocking => println!(
                "❌ {} unresolved high or critical issue(s)",
                report.unresolved_blocking().len()
            ),
        }
    }
    Ok(outcome)
}

fn save(report: &RunReport, path: &Path) -> Result<()> {
    report
        .save(path)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!("💾 Report written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_execute_args() {
        let cli = Cli::try_parse_from([
            "remedy",
            "execute",
            "--path",
            "repo",
            "--format",
            "json",
            "--disable",
            "deployment",
            "--disable",
            "types",
            "--mode",
            "batched",
        ])
        .unwrap();
        let Commands::Execute(args) = cli.command else {
            panic!("expected execute");
        };
        assert_eq!(args.common.path, PathBuf::from("repo"));
        assert_eq!(args.common.format, OutputFormat::Json);
        assert_eq!(args.common.disabled, vec!["deployment", "types"]);
        assert!(args.mode.is_some());
        assert!(!args.allow_unvalidated);

        let cli = Cli::try_parse_from(["remedy", "execute", "--allow-unvalidated"]).unwrap();
        let Commands::Execute(args) = cli.command else {
            panic!("expected execute");
        };
        assert!(args.allow_unvalidated);
        assert!(Cli::try_parse_from(["remedy", "plan", "--allow-unvalidated"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["remedy", "analyze", "--skip-baseline", "-v", "--log-json"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.log_json);
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert!(args.skip_baseline);
        assert_eq!(args.common.format, OutputFormat::Text);
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["remedy", "plan", "--format", "xml"]).is_err());
        assert!(Cli::try_parse_from(["remedy", "execute", "--skip-baseline"]).is_err());
    }
}
