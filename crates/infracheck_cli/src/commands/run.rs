//! Run command - provision, assert, tear down.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tracing::{info, warn};

use infracheck_cloud::AwsInspector;
use infracheck_core::{
    generate_unique_id, AssertionSet, ConnectivityProbe, HarnessConfig, LifecycleController, RunReport, RunStatus,
    StaticProbe, TcpProbe, TeardownOutcome,
};
use infracheck_iac::TerraformEngine;
use infracheck_runner::ProcessRunner;

use crate::ExitCodes;

#[derive(Args)]
pub struct RunArgs {
    /// Harness configuration file
    #[arg(short, long, env = "INFRACHECK_CONFIG", default_value = "harness.yaml")]
    pub config: PathBuf,

    /// Number of independent runs to execute concurrently
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub runs: u32,

    /// Seed for environment names (random when omitted)
    #[arg(long, env = "INFRACHECK_SEED")]
    pub seed: Option<u64>,

    /// Print reports as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Treat the database endpoint as reachable without connecting
    #[arg(long)]
    pub dry_probe: bool,

    /// Directory for per-run working copies (defaults to the system temp dir)
    #[arg(long, env = "INFRACHECK_WORK_ROOT")]
    pub work_root: Option<PathBuf>,

    /// Terraform binary
    #[arg(long, env = "INFRACHECK_TERRAFORM_BIN", default_value = "terraform")]
    pub terraform_bin: String,

    /// Stream terraform output to the log while it runs
    #[arg(long)]
    pub stream_logs: bool,
}

pub async fn execute(args: RunArgs) -> Result<u8> {
    let config = HarnessConfig::load(&args.config)
        .with_context(|| format!("Loading harness config {}", args.config.display()))?;

    let work_root = args
        .work_root
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("infracheck"));

    let runner = ProcessRunner::new().with_interrupt_grace(config.interrupt_grace());
    let mut engine = TerraformEngine::new(Arc::new(runner))
        .with_binary(&args.terraform_bin)
        .with_work_root(&work_root);
    if args.stream_logs {
        engine = engine.with_streamed_logs();
    }
    engine.check_available().await?;

    let probe: Arc<dyn ConnectivityProbe> = if args.dry_probe {
        Arc::new(StaticProbe::reachable())
    } else {
        Arc::new(TcpProbe::new())
    };

    let assertions = AssertionSet::standard(&config.checks, probe);
    let controller = LifecycleController::new(Arc::new(engine), Arc::new(AwsInspector::new()), assertions, config);

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let ids: Vec<String> = (0..args.runs).map(|_| generate_unique_id(&mut rng)).collect();

    info!("Starting {} run(s) with working copies under {}", ids.len(), work_root.display());

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, tearing down");
            let _ = cancel_tx.send(true);
        }
    });

    let reports = run_all(&controller, ids, cancel_rx).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_summary(&reports);
    }

    Ok(exit_code(&reports))
}

/// Run every id as its own task and collect the reports in id order.
pub async fn run_all(
    controller: &LifecycleController,
    ids: Vec<String>,
    cancel: watch::Receiver<bool>,
) -> Result<Vec<RunReport>> {
    let mut tasks = Vec::with_capacity(ids.len());
    for id in ids {
        let controller = controller.clone();
        let mut cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            let cancelled = async move {
                // A dropped sender means nobody can cancel any more
                let closed = cancel.wait_for(|c| *c).await.is_err();
                if closed {
                    std::future::pending::<()>().await;
                }
            };
            controller.run_with_id(&id, cancelled).await
        }));
    }

    let mut reports = Vec::with_capacity(tasks.len());
    for task in tasks {
        reports.push(task.await.context("Run task panicked")?);
    }
    Ok(reports)
}

/// Most severe status across all runs.
pub fn exit_code(reports: &[RunReport]) -> u8 {
    match reports.iter().map(RunReport::status).min() {
        None | Some(RunStatus::Passed) => ExitCodes::SUCCESS,
        Some(RunStatus::ProvisionFailed) => ExitCodes::PROVISION_ERROR,
        Some(RunStatus::Interrupted) => ExitCodes::GENERAL_ERROR,
        Some(RunStatus::AssertionsFailed) => ExitCodes::ASSERTION_FAILURE,
        Some(RunStatus::TeardownFailed) => ExitCodes::TEARDOWN_FAILURE,
    }
}

fn print_summary(reports: &[RunReport]) {
    for report in reports {
        println!();
        println!("🏗️  {} ({})", report.environment_name, report.status());

        for result in &report.assertions {
            if result.passed {
                println!("   ✅ {} ({}ms)", result.name, result.duration_ms);
            } else {
                println!(
                    "   ❌ {} - {}",
                    result.name,
                    result.message.as_deref().unwrap_or("failed")
                );
            }
        }

        if let Some(failure) = &report.provision_error {
            println!("   ❌ Provisioning failed: {}", failure.message);
        }
        if let Some(reason) = &report.interruption {
            println!("   ⚠️  Interrupted: {}", reason);
        }
        if let Some(err) = &report.output_error {
            println!("   ⚠️  Outputs unavailable: {}", err);
        }
        match &report.teardown {
            TeardownOutcome::Destroyed => println!("   🧹 Destroyed"),
            TeardownOutcome::NotNeeded => println!("   🧹 Nothing to destroy"),
            TeardownOutcome::Failed { message, .. } => {
                println!("   ⚠️  Teardown failed, resources may remain: {}", message)
            }
        }
    }

    let passed = reports.iter().filter(|r| r.passed()).count();
    println!();
    if passed == reports.len() {
        println!("✅ All {} run(s) passed!", reports.len());
    } else {
        println!("❌ {}/{} run(s) passed.", passed, reports.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infracheck_cloud::MockInspector;
    use infracheck_iac::{MockEngine, OutputSet};

    fn controller(engine: &MockEngine) -> LifecycleController {
        let config = HarnessConfig::new("terraform", "us-east-1", "docuthinker", "docuthinker-test");
        let assertions = AssertionSet::new().with(infracheck_core::assertions::LogGroupPresent {
            output: "cloudwatch_log_group".to_string(),
        });
        LifecycleController::new(
            Arc::new(engine.clone()),
            Arc::new(MockInspector::new()),
            assertions,
            config,
        )
    }

    #[tokio::test]
    async fn test_run_all_keeps_id_order() {
        let engine = MockEngine::new().with_outputs(OutputSet::new().with("cloudwatch_log_group", "/aws/eks/x"));
        let (_tx, rx) = watch::channel(false);

        let ids = vec!["aaaaaa".to_string(), "bbbbbb".to_string(), "cccccc".to_string()];
        let reports = run_all(&controller(&engine), ids, rx).await.unwrap();

        let names: Vec<_> = reports.iter().map(|r| r.environment_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["docuthinker-test-aaaaaa", "docuthinker-test-bbbbbb", "docuthinker-test-cccccc"]
        );
        assert_eq!(exit_code(&reports), ExitCodes::SUCCESS);
        assert_eq!(engine.destroy_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_signal_reaches_every_run() {
        let engine = MockEngine::new().with_apply(infracheck_iac::MockApply::Hang);
        let (tx, rx) = watch::channel(false);

        let controller = controller(&engine);
        let handle = tokio::spawn(async move {
            run_all(&controller, vec!["run001".to_string(), "run002".to_string()], rx).await
        });

        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        tx.send(true).unwrap();

        let reports = handle.await.unwrap().unwrap();
        assert!(reports.iter().all(|r| r.status() == RunStatus::Interrupted));
        assert_eq!(exit_code(&reports), ExitCodes::GENERAL_ERROR);
        assert_eq!(engine.destroy_calls(), 2);
    }

    #[tokio::test]
    async fn test_exit_code_takes_most_severe() {
        let engine = MockEngine::new().with_outputs(OutputSet::new());
        let (_tx, rx) = watch::channel(false);
        let mut reports = run_all(&controller(&engine), vec!["abc123".to_string()], rx)
            .await
            .unwrap();
        assert_eq!(exit_code(&reports), ExitCodes::ASSERTION_FAILURE);

        let failing = MockEngine::new().failing_apply("Error: creating EKS Cluster", false);
        let (_tx, rx) = watch::channel(false);
        reports.extend(run_all(&controller(&failing), vec!["def456".to_string()], rx).await.unwrap());
        assert_eq!(exit_code(&reports), ExitCodes::PROVISION_ERROR);

        assert_eq!(exit_code(&[]), ExitCodes::SUCCESS);
    }

    #[tokio::test]
    async fn test_missing_config_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            config: dir.path().join("missing.yaml"),
            runs: 1,
            seed: Some(1),
            json: false,
            dry_probe: true,
            work_root: Some(dir.path().to_path_buf()),
            terraform_bin: "terraform".to_string(),
            stream_logs: false,
        };

        let err = execute(args).await.unwrap_err();
        assert!(err.downcast_ref::<infracheck_core::CoreError>().is_some());
    }
}
