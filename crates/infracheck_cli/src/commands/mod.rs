//! CLI command definitions.

use clap::{Parser, Subcommand};

pub mod check_config;
pub mod run;

/// infracheck - provision, assert, tear down
#[derive(Parser)]
#[command(name = "infracheck")]
#[command(version, about = "infracheck - end-to-end infrastructure validation harness")]
#[command(long_about = r#"
infracheck provisions a disposable environment from Terraform definitions,
checks the live resources, and always destroys the environment again.

COMMANDS:
  run           → Provision, assert and tear down (one or more concurrent runs)
  check-config  → Validate a harness file without provisioning anything

EXIT CODES:
  0 - All runs passed
  1 - General error
  2 - Invalid configuration
  3 - Assertion failure
  5 - Provisioning error
  6 - Teardown failure (resources may remain)
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "INFRACHECK_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision, assert and tear down
    Run(run::RunArgs),

    /// Validate a harness configuration file
    #[command(name = "check-config")]
    CheckConfig(check_config::CheckConfigArgs),
}
