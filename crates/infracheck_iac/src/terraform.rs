//! Terraform engine driven through the terraform CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, error, info, warn};

use infracheck_runner::{
    retry_with_retryable_errors, CancelSignal, CommandConfig, CommandRunner, RunConfig, RunnerError,
};

use crate::deployment::{DeploymentHandle, OutputSet};
use crate::engine::{ApplyFailure, InfraEngine};
use crate::error::{IacError, IacResult};
use crate::request::DeploymentRequest;
use crate::workspace;

/// Transient terraform failures worth retrying, with a human-readable reason.
const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    (r"(?i)read: connection reset by peer", "Connection reset while reaching a remote endpoint"),
    (r"(?i)TLS handshake timeout", "TLS handshake timed out"),
    (r"(?i)Error installing provider", "Failed to download a terraform provider"),
    (r"(?i)Failed to query available provider packages", "Provider registry query failed"),
    (r"(?i)could not query provider registry", "Provider registry query failed"),
    (r"(?i)timeout while waiting for plugin to start", "Provider plugin start timed out"),
    (r"(?i)timed out waiting for server handshake", "Provider plugin handshake timed out"),
    (r"(?i)Could not download module", "Module download failed"),
    (r"(?i)RequestError: send request failed", "Cloud API request failed"),
    (r"(?i)Error acquiring the state lock", "State lock held by another operation"),
];

/// [`InfraEngine`] implementation running the terraform CLI.
///
/// Every request is applied from its own copy of the definition directory,
/// `<work_root>/<environment_name>`, so concurrent runs never share
/// `.terraform/` or state files.
pub struct TerraformEngine {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    work_root: PathBuf,
    retryable_errors: Vec<(Regex, String)>,
    run_config: RunConfig,
}

impl TerraformEngine {
    /// Create an engine with working copies under `$TMPDIR/infracheck`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        let retryable_errors = DEFAULT_RETRYABLE_ERRORS
            .iter()
            .filter_map(|(pattern, reason)| Regex::new(pattern).ok().map(|re| (re, reason.to_string())))
            .collect();

        Self {
            runner,
            binary: "terraform".to_string(),
            work_root: default_work_root(),
            retryable_errors,
            run_config: RunConfig::default().timeout(3600),
        }
    }

    /// Use a different binary, e.g. `tofu` or an absolute path.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Keep working copies under `work_root` instead of the temp dir.
    pub fn with_work_root(mut self, work_root: impl Into<PathBuf>) -> Self {
        self.work_root = work_root.into();
        self
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// Add a retryable error pattern.
    pub fn with_retryable_error(mut self, pattern: &str, reason: impl Into<String>) -> IacResult<Self> {
        let re = Regex::new(pattern).map_err(|e| IacError::Workspace(format!("invalid pattern {}: {}", pattern, e)))?;
        self.retryable_errors.push((re, reason.into()));
        Ok(self)
    }

    /// Per-command timeout in seconds (0 disables it).
    pub fn with_command_timeout(mut self, seconds: u64) -> Self {
        self.run_config = self.run_config.timeout(seconds);
        self
    }

    /// Echo terraform output through the log as it is produced.
    pub fn with_streamed_logs(mut self) -> Self {
        self.run_config = self.run_config.stream();
        self
    }

    /// Check that the terraform binary can be launched.
    pub async fn check_available(&self) -> IacResult<()> {
        if self.runner.is_available(&self.binary).await? {
            Ok(())
        } else {
            Err(IacError::TerraformNotAvailable(self.binary.clone()))
        }
    }

    /// Reason a failed step may be retried, if it matches a known transient error.
    pub fn retry_reason(&self, error: &IacError) -> Option<&str> {
        let output = error.diagnostics()?;
        self.retryable_errors
            .iter()
            .find(|(re, _)| re.is_match(output))
            .map(|(_, reason)| reason.as_str())
    }

    fn is_retryable(&self, error: &IacError) -> bool {
        if matches!(error, IacError::Interrupted(_)) {
            return false;
        }
        match self.retry_reason(error) {
            Some(reason) => {
                info!("Retrying terraform step: {}", reason);
                true
            }
            None => false,
        }
    }

    fn working_dir_for(&self, request: &DeploymentRequest) -> PathBuf {
        workspace::working_copy_path(&self.work_root, request.environment_name())
    }

    fn var_args(request: &DeploymentRequest) -> Vec<String> {
        request
            .variables()
            .iter()
            .flat_map(|(name, value)| ["-var".to_string(), format!("{}={}", name, value)])
            .collect()
    }

    fn command(&self, working_dir: &Path, request: &DeploymentRequest, args: &[String]) -> CommandConfig {
        CommandConfig::new(&self.binary)
            .args(args.iter().cloned())
            .workdir(working_dir)
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .envs(request.env_vars())
    }

    /// Run one terraform step, turning a non-zero exit into `on_failure(output)`.
    async fn run_step(
        &self,
        working_dir: &Path,
        request: &DeploymentRequest,
        args: &[String],
        on_failure: fn(String) -> IacError,
        cancel: &CancelSignal,
    ) -> IacResult<String> {
        let config = self.command(working_dir, request, args);
        let result = match self.runner.run_until(&config, &self.run_config, cancel).await {
            Err(RunnerError::Interrupted(output)) => return Err(IacError::Interrupted(output)),
            other => other?,
        };
        if result.success() {
            Ok(result.stdout)
        } else {
            Err(on_failure(result.combined_output()))
        }
    }

    /// Run a step with the request's retry policy for transient errors.
    async fn run_step_with_retry(
        &self,
        description: &str,
        working_dir: &Path,
        request: &DeploymentRequest,
        args: Vec<String>,
        on_failure: fn(String) -> IacError,
        cancel: &CancelSignal,
    ) -> IacResult<String> {
        let policy = request.retry_policy();
        retry_with_retryable_errors(
            description,
            &policy,
            |e| self.is_retryable(e),
            || self.run_step(working_dir, request, &args, on_failure, cancel),
        )
        .await
        .map_err(|e| e.into_last_error())
    }

    async fn init(&self, working_dir: &Path, request: &DeploymentRequest, cancel: &CancelSignal) -> IacResult<()> {
        info!("Running terraform init in {:?}", working_dir);
        let args = vec!["init".to_string(), "-input=false".to_string(), "-no-color".to_string()];
        self.run_step_with_retry("terraform init", working_dir, request, args, IacError::InitFailed, cancel)
            .await
            .map(|_| ())
    }

    async fn apply(&self, working_dir: &Path, request: &DeploymentRequest, cancel: &CancelSignal) -> IacResult<()> {
        info!("Running terraform apply in {:?}", working_dir);
        let mut args = vec![
            "apply".to_string(),
            "-input=false".to_string(),
            "-auto-approve".to_string(),
            "-no-color".to_string(),
        ];
        args.extend(Self::var_args(request));
        self.run_step_with_retry("terraform apply", working_dir, request, args, IacError::ApplyFailed, cancel)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl InfraEngine for TerraformEngine {
    async fn init_and_apply(
        &self,
        request: &DeploymentRequest,
        cancel: &CancelSignal,
    ) -> Result<DeploymentHandle, ApplyFailure> {
        let working_dir = self.working_dir_for(request);
        workspace::create_working_copy(request.definition_dir(), &working_dir).map_err(ApplyFailure::new)?;

        if let Err(e) = self.init(&working_dir, request, cancel).await {
            error!("terraform init failed for {}: {}", request.environment_name(), e);
            // Nothing has been provisioned yet, only the copy needs to go.
            if let Err(cleanup) = workspace::remove_working_copy(&working_dir) {
                warn!("Failed to remove working copy {:?}: {}", working_dir, cleanup);
            }
            return Err(ApplyFailure::new(e));
        }

        let handle = DeploymentHandle::new(request, &working_dir, true);

        match self.apply(&working_dir, request, cancel).await {
            Ok(()) => {
                info!("Applied {}", request.environment_name());
                Ok(handle)
            }
            Err(e @ IacError::Interrupted(_)) => {
                warn!("terraform apply interrupted for {}; state kept in {:?}", request.environment_name(), working_dir);
                Err(ApplyFailure::with_partial(e, handle))
            }
            Err(e) => {
                error!("terraform apply failed for {}: {}", request.environment_name(), e);
                Err(ApplyFailure::with_partial(e, handle))
            }
        }
    }

    async fn outputs(&self, handle: &DeploymentHandle) -> IacResult<OutputSet> {
        debug!("Reading terraform outputs for {}", handle.id());
        let args = ["output".to_string(), "-no-color".to_string(), "-json".to_string()];
        let stdout = self
            .run_step(
                handle.working_dir(),
                handle.request(),
                &args,
                IacError::OutputFailed,
                &CancelSignal::never(),
            )
            .await?;
        OutputSet::from_terraform_json(&stdout)
    }

    async fn destroy(&self, handle: DeploymentHandle) -> IacResult<()> {
        info!("Running terraform destroy in {:?}", handle.working_dir());
        let mut args = vec![
            "destroy".to_string(),
            "-auto-approve".to_string(),
            "-input=false".to_string(),
            "-no-color".to_string(),
        ];
        args.extend(Self::var_args(handle.request()));

        self.run_step_with_retry(
            "terraform destroy",
            handle.working_dir(),
            handle.request(),
            args,
            IacError::DestroyFailed,
            &CancelSignal::never(),
        )
        .await
        .map_err(|e| {
            error!("terraform destroy failed for {}; state kept in {:?}", handle.id(), handle.working_dir());
            e
        })?;

        if handle.owns_working_dir() {
            workspace::remove_working_copy(handle.working_dir())?;
        }
        info!("Destroyed {}", handle.id());
        Ok(())
    }

    async fn recover(&self, request: &DeploymentRequest) -> Option<DeploymentHandle> {
        // Only this environment's copy is searched; state in the shared
        // definition directory belongs to nobody we know of.
        let working_dir = self.working_dir_for(request);
        if workspace::has_engine_state(&working_dir) {
            warn!("Recovered partial state for {} in {:?}", request.environment_name(), working_dir);
            Some(DeploymentHandle::new(request, working_dir, true))
        } else {
            if working_dir.exists() {
                // Copied but never initialised.
                let _ = workspace::remove_working_copy(&working_dir);
            }
            None
        }
    }
}

fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("infracheck")
}
