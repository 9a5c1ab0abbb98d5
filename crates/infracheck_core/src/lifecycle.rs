//! Provisioning lifecycle controller.
//!
//! Sequences one run through
//! `Idle → Applying → Applied → Asserting → TearingDown → Destroyed`.
//! Once a deployment handle exists, every path ends in exactly one destroy
//! call for it: assertion failures, unreadable outputs, cancellation and
//! partial applies all flow into the same teardown step.
//!
//! A failed apply moves to `Failed`; if the engine left partial state behind
//! the run continues `Failed → TearingDown → Destroyed`. A failed destroy
//! leaves the run in `TearingDown` with [`TeardownOutcome::Failed`].
//!
//! Cancellation and the apply timeout never drop a running apply outright.
//! The engine is signalled and given the interrupt grace period to stop and
//! hand back its state; only an engine that ignores the signal is abandoned,
//! after which its state is looked up with `recover`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use infracheck_cloud::ResourceInspector;
use infracheck_iac::{DeploymentHandle, DeploymentRequest, InfraEngine, OutputSet};
use infracheck_runner::CancelSignal;
use rand::Rng;
use tracing::{error, info, warn};

use crate::assertions::{AssertionContext, AssertionSet};
use crate::config::HarnessConfig;
use crate::report::{ProvisionFailure, RunReport, RunState, TeardownOutcome};
use crate::unique_id::{environment_name, generate_unique_id};

/// Extra wait on top of the engine's own interrupt grace.
const STOP_MARGIN: Duration = Duration::from_secs(30);

enum ApplyOutcome {
    Applied(DeploymentHandle),
    Failed(infracheck_iac::ApplyFailure),
    /// Timed out or cancelled. `state` is what the engine handed back once it
    /// stopped; `None` if it had nothing or never stopped.
    Interrupted {
        reason: String,
        state: Option<DeploymentHandle>,
    },
}

/// Drives runs against an engine and an inspector.
///
/// Cheap to share between concurrent runs: it holds only `Arc`s and
/// immutable configuration.
#[derive(Clone)]
pub struct LifecycleController {
    engine: Arc<dyn InfraEngine>,
    inspector: Arc<dyn ResourceInspector>,
    assertions: AssertionSet,
    config: Arc<HarnessConfig>,
    apply_timeout: Duration,
    interrupt_grace: Duration,
}

impl LifecycleController {
    pub fn new(
        engine: Arc<dyn InfraEngine>,
        inspector: Arc<dyn ResourceInspector>,
        assertions: AssertionSet,
        config: HarnessConfig,
    ) -> Self {
        let apply_timeout = config.apply_timeout();
        let interrupt_grace = config.interrupt_grace();
        Self {
            engine,
            inspector,
            assertions,
            config: Arc::new(config),
            apply_timeout,
            interrupt_grace,
        }
    }

    pub fn with_apply_timeout(mut self, timeout: Duration) -> Self {
        self.apply_timeout = timeout;
        self
    }

    /// How long a signalled engine gets to stop before it is abandoned.
    pub fn with_interrupt_grace(mut self, grace: Duration) -> Self {
        self.interrupt_grace = grace;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run once with an id drawn from `rng`.
    pub async fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> RunReport {
        let unique_id = generate_unique_id(rng);
        self.run_with_id(&unique_id, std::future::pending()).await
    }

    /// Run once; `cancel` completing interrupts the run but never skips teardown.
    pub async fn run_until<R, C>(&self, rng: &mut R, cancel: C) -> RunReport
    where
        R: Rng + ?Sized,
        C: Future<Output = ()>,
    {
        let unique_id = generate_unique_id(rng);
        self.run_with_id(&unique_id, cancel).await
    }

    /// Run once under a pre-generated unique id.
    pub async fn run_with_id<C>(&self, unique_id: &str, cancel: C) -> RunReport
    where
        C: Future<Output = ()>,
    {
        let env_name = environment_name(&self.config.name_prefix, unique_id);
        let mut report = RunReport::new(unique_id, &env_name);
        let request = self.config.deployment_request(&env_name);

        tokio::pin!(cancel);

        report.transition(RunState::Applying);
        info!("[{}] Applying {}", env_name, request.definition_dir().display());

        let handle = match self.apply(&request, cancel.as_mut()).await {
            ApplyOutcome::Applied(handle) => handle,
            ApplyOutcome::Failed(failure) => {
                error!("[{}] Provisioning failed: {}", env_name, failure.error);
                report.transition(RunState::Failed);
                report.provision_error = Some(ProvisionFailure {
                    message: failure.error.to_string(),
                    diagnostics: failure.error.diagnostics().map(str::to_string),
                });
                if let Some(partial) = failure.partial {
                    warn!("[{}] Tearing down partially created resources", env_name);
                    self.teardown(partial, &mut report).await;
                }
                return report.finish();
            }
            ApplyOutcome::Interrupted { reason, state } => {
                warn!("[{}] Run interrupted: {}", env_name, reason);
                report.transition(RunState::Failed);
                report.interruption = Some(reason);
                match state {
                    Some(handle) => self.teardown(handle, &mut report).await,
                    None => self.recover_and_teardown(&request, &mut report).await,
                }
                return report.finish();
            }
        };

        report.transition(RunState::Applied);
        info!("[{}] Applied", env_name);

        let outputs = match self.engine.outputs(&handle).await {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!("[{}] Could not read outputs: {}", env_name, e);
                report.output_error = Some(e.to_string());
                OutputSet::new()
            }
        };

        report.transition(RunState::Asserting);
        let ctx = AssertionContext::new(
            outputs,
            Arc::clone(&self.inspector),
            &self.config.region,
            &self.config.project,
            &self.config.environment,
        );

        tokio::select! {
            results = self.assertions.evaluate(&ctx) => report.assertions = results,
            _ = &mut cancel => {
                warn!("[{}] Cancelled during assertions", env_name);
                report.interruption = Some("cancelled during assertions".to_string());
            }
        }

        self.teardown(handle, &mut report).await;
        report.finish()
    }

    /// Apply under the timeout and `cancel`.
    ///
    /// An interrupted engine keeps running until it stops or the grace period
    /// runs out.
    async fn apply<C>(&self, request: &DeploymentRequest, cancel: Pin<&mut C>) -> ApplyOutcome
    where
        C: Future<Output = ()>,
    {
        let (trigger, signal) = CancelSignal::pair();
        let apply = self.engine.init_and_apply(request, &signal);
        tokio::pin!(apply);

        let deadline = tokio::time::sleep(self.apply_timeout);
        tokio::pin!(deadline);

        let reason = tokio::select! {
            result = &mut apply => {
                return match result {
                    Ok(handle) => ApplyOutcome::Applied(handle),
                    Err(failure) => ApplyOutcome::Failed(failure),
                };
            }
            _ = &mut deadline => format!("apply did not finish within {:?}", self.apply_timeout),
            _ = cancel => "cancelled during apply".to_string(),
        };

        info!("[{}] Asking the engine to stop", request.environment_name());
        trigger.cancel();

        let grace = self.interrupt_grace + STOP_MARGIN;
        let state = match tokio::time::timeout(grace, &mut apply).await {
            Ok(Ok(handle)) => Some(handle),
            Ok(Err(failure)) => {
                info!("[{}] Engine stopped: {}", request.environment_name(), failure.error);
                failure.partial
            }
            Err(_) => {
                error!("[{}] Engine did not stop within {:?}, abandoning it", request.environment_name(), grace);
                None
            }
        };
        ApplyOutcome::Interrupted { reason, state }
    }

    async fn recover_and_teardown(&self, request: &DeploymentRequest, report: &mut RunReport) {
        match self.engine.recover(request).await {
            Some(handle) => {
                warn!("[{}] Found state from the interrupted apply", request.environment_name());
                self.teardown(handle, report).await;
            }
            None => info!("[{}] Nothing to tear down", request.environment_name()),
        }
    }

    async fn teardown(&self, handle: DeploymentHandle, report: &mut RunReport) {
        let env_name = handle.id().to_string();
        report.transition(RunState::TearingDown);
        info!("[{}] Destroying", env_name);

        match self.engine.destroy(handle).await {
            Ok(()) => {
                report.teardown = TeardownOutcome::Destroyed;
                report.transition(RunState::Destroyed);
                info!("[{}] Destroyed", env_name);
            }
            Err(e) => {
                warn!("[{}] Teardown failed, resources may remain: {}", env_name, e);
                report.teardown = TeardownOutcome::Failed {
                    message: e.to_string(),
                    diagnostics: e.diagnostics().map(str::to_string),
                };
            }
        }
    }
}
