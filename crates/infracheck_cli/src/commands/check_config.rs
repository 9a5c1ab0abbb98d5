//! Check-config command - validate a harness file without provisioning.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use infracheck_core::{environment_name, AssertionSet, HarnessConfig, StaticProbe};

use crate::ExitCodes;

#[derive(Args)]
pub struct CheckConfigArgs {
    /// Harness configuration file
    #[arg(short, long, env = "INFRACHECK_CONFIG", default_value = "harness.yaml")]
    pub config: PathBuf,

    /// Print the resolved configuration as YAML
    #[arg(long)]
    pub print: bool,
}

pub async fn execute(args: CheckConfigArgs) -> Result<u8> {
    info!("Checking harness config: {}", args.config.display());

    let config = HarnessConfig::load(&args.config)
        .with_context(|| format!("Loading harness config {}", args.config.display()))?;

    println!("📋 {}", args.config.display());
    println!("   Definitions:  {}", config.definition_dir.display());
    if !config.definition_dir.is_dir() {
        println!("   ⚠️  Definition directory does not exist yet");
    }
    println!("   Region:       {}", config.region);
    println!("   Environments: {}", environment_name(&config.name_prefix, "<id>"));
    println!(
        "   Engine retry: {} retries, {}s apart",
        config.max_retries, config.time_between_retries_secs
    );
    println!(
        "   Database:     {} attempts, {}s apart",
        config.checks.db_attempts, config.checks.db_delay_secs
    );

    let set = AssertionSet::standard(&config.checks, Arc::new(StaticProbe::reachable()));
    println!("   Checks ({:?}):", set.mode());
    for name in set.names() {
        println!("     - {}", name);
    }

    if args.print {
        println!();
        print!("{}", config.to_yaml()?);
    }

    println!();
    println!("✅ Configuration is valid");
    Ok(ExitCodes::SUCCESS)
}
