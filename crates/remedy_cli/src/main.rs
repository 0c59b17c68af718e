//! Remedy CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or configuration
//! - 3: Unresolved high or critical issues
//! - 4: Checkpoint restore failure (repository state unknown)

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use remedy_core::CoreError;
use remedy_policy::PolicyError;

mod bootstrap;
mod commands;
mod config;

use commands::{Cli, Commands, Outcome};
use config::ConfigError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_CONFIG: u8 = 2;
    pub const UNRESOLVED_BLOCKING: u8 = 3;
    pub const RESTORE_FAILURE: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let result = match cli.command {
        Commands::Analyze(args) => commands::analyze::execute(args).await,
        Commands::Plan(args) => commands::plan::execute(args).await,
        Commands::Execute(args) => commands::execute::execute(args).await,
    };

    match result {
        Ok(Outcome::Clean) => ExitCode::from(ExitCodes::SUCCESS),
        Ok(Outcome::UnresolvedBlocking) => ExitCode::from(ExitCodes::UNRESOLVED_BLOCKING),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "remedy=debug,warn" } else { "remedy=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(filter);
    // Another subscriber may already be installed; keep it.
    let _ = if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
}

/// Map an error to an exit code by inspecting its cause chain.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(core) = cause.downcast_ref::<CoreError>() {
            if core.is_fatal() {
                return ExitCodes::RESTORE_FAILURE;
            }
            if matches!(core, CoreError::InvalidConfiguration(_)) {
                return ExitCodes::INVALID_CONFIG;
            }
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return ExitCodes::INVALID_CONFIG;
        }
        if let Some(PolicyError::InvalidConfiguration(_) | PolicyError::Pattern(_)) = cause.downcast_ref::<PolicyError>() {
            return ExitCodes::INVALID_CONFIG;
        }
    }
    ExitCodes::GENERAL_ERROR
}
