//! Command runner trait and types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelSignal;
use crate::config::{CommandConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};

/// Result of a command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code of the process (-1 when killed by a signal)
    pub exit_code: i64,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Execution start time
    pub started_at: DateTime<Utc>,
    /// Execution end time
    pub finished_at: DateTime<Utc>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Check if execution was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get combined output (stdout + stderr).
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Check whether a program can be launched.
    async fn is_available(&self, program: &str) -> RunnerResult<bool>;

    /// Run a command to completion and capture its output.
    ///
    /// A non-zero exit code is not an error; callers inspect
    /// [`ExecutionResult::success`].
    async fn run(&self, config: &CommandConfig, run_config: &RunConfig) -> RunnerResult<ExecutionResult>;

    /// Like [`CommandRunner::run`], but stop when `cancel` fires and return
    /// [`RunnerError::Interrupted`].
    ///
    /// The default drops the running command. Runners that can ask a command
    /// to stop gracefully override this.
    async fn run_until(
        &self,
        config: &CommandConfig,
        run_config: &RunConfig,
        cancel: &CancelSignal,
    ) -> RunnerResult<ExecutionResult> {
        if cancel.is_cancelled() {
            return Err(RunnerError::Interrupted(String::new()));
        }
        let mut cancel = cancel.clone();
        tokio::select! {
            result = self.run(config, run_config) => result,
            _ = cancel.cancelled() => Err(RunnerError::Interrupted(String::new())),
        }
    }
}
