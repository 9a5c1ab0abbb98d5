//! infracheck CLI - Main entry point.
//!
//! Exit codes:
//! - 0: All runs passed
//! - 1: General error (including interrupted runs)
//! - 2: Invalid configuration
//! - 3: Assertion failure
//! - 5: Provisioning error
//! - 6: Teardown failure (resources may remain)

use std::process::ExitCode;

use clap::Parser;
use infracheck_core::CoreError;
use infracheck_iac::IacError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_CONFIG: u8 = 2;
    pub const ASSERTION_FAILURE: u8 = 3;
    pub const PROVISION_ERROR: u8 = 5;
    pub const TEARDOWN_FAILURE: u8 = 6;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::CheckConfig(args) => commands::check_config::execute(args).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

/// Logs go to stderr so `--json` reports on stdout stay parseable.
fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("infracheck={},warn", level)));

    let registry = tracing_subscriber::registry().with(filter);
    let log_result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if e.downcast_ref::<CoreError>().is_some() {
        ExitCodes::INVALID_CONFIG
    } else if e.downcast_ref::<IacError>().is_some() {
        ExitCodes::PROVISION_ERROR
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
