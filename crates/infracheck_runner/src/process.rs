//! Child-process command runner.
//!
//! Spawns external programs with tokio, captures stdout and stderr line by line
//! and enforces the configured timeout. On timeout or cancellation the child is
//! first interrupted (SIGINT) and given a grace period to shut down cleanly;
//! only then is it killed. A dropped future still kills the child.
//!
//! On unix each child runs in its own process group, so a Ctrl-C at the
//! terminal reaches the harness only and the child receives exactly one
//! interrupt, from the runner.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::config::{CommandConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Time a child gets between SIGINT and SIGKILL.
pub const DEFAULT_INTERRUPT_GRACE: Duration = Duration::from_secs(300);

/// Runs commands as local child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    interrupt_grace: Duration,
}

enum Stop {
    Timeout,
    Cancelled,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            interrupt_grace: DEFAULT_INTERRUPT_GRACE,
        }
    }

    /// How long an interrupted child may take to exit before it is killed.
    pub fn with_interrupt_grace(mut self, grace: Duration) -> Self {
        self.interrupt_grace = grace;
        self
    }

    pub fn interrupt_grace(&self) -> Duration {
        self.interrupt_grace
    }

    fn build_command(config: &CommandConfig) -> Command {
        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &config.workdir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Interrupt the child, wait up to the grace period, then kill it.
    async fn stop(&self, child: &mut Child, program: &str) {
        if let Some(pid) = child.id() {
            if send_interrupt(pid) {
                info!("Interrupted {} (pid {}), waiting up to {:?}", program, pid, self.interrupt_grace);
                match tokio::time::timeout(self.interrupt_grace, child.wait()).await {
                    Ok(Ok(status)) => {
                        info!("{} stopped after interrupt ({})", program, status);
                        return;
                    }
                    Ok(Err(e)) => warn!("Waiting for {} failed: {}", program, e),
                    Err(_) => warn!("{} ignored the interrupt for {:?}, killing it", program, self.interrupt_grace),
                }
            }
        }
        if let Err(e) = child.kill().await {
            debug!("Kill of {} failed: {}", program, e);
        }
    }

    async fn execute(
        &self,
        config: &CommandConfig,
        run_config: &RunConfig,
        cancel: &CancelSignal,
    ) -> RunnerResult<ExecutionResult> {
        if cancel.is_cancelled() {
            return Err(RunnerError::Interrupted(String::new()));
        }

        let started_at = Utc::now();
        debug!("Executing: {}", config.display());
        let start = Instant::now();

        let mut child = Self::build_command(config).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunnerError::ProgramNotAvailable(config.program.clone())
            } else {
                RunnerError::ExecutionFailed(format!("Failed to spawn {}: {}", config.program, e))
            }
        })?;

        let stdout = tokio::spawn(collect_lines(child.stdout.take(), "stdout", run_config.stream_logs));
        let stderr = tokio::spawn(collect_lines(child.stderr.take(), "stderr", run_config.stream_logs));

        let timeout_seconds = run_config.timeout_seconds;
        let deadline = async move {
            if timeout_seconds > 0 {
                tokio::time::sleep(Duration::from_secs(timeout_seconds)).await;
            } else {
                std::future::pending::<()>().await;
            }
        };
        let mut cancel = cancel.clone();

        let outcome: Result<ExitStatus, Stop> = tokio::select! {
            status = child.wait() => Ok(status?),
            _ = deadline => Err(Stop::Timeout),
            _ = cancel.cancelled() => Err(Stop::Cancelled),
        };

        let status = match outcome {
            Ok(status) => status,
            Err(stop) => {
                self.stop(&mut child, &config.program).await;
                let stdout = stdout.await.unwrap_or_default();
                let stderr = stderr.await.unwrap_or_default();
                return Err(match stop {
                    Stop::Timeout => RunnerError::Timeout(timeout_seconds),
                    Stop::Cancelled => RunnerError::Interrupted(combine(stdout, stderr)),
                });
            }
        };

        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();

        Ok(ExecutionResult {
            exit_code: status.code().map(i64::from).unwrap_or(-1),
            stdout,
            stderr,
            started_at,
            finished_at: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(unix)]
fn send_interrupt(pid: u32) -> bool {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    match signal::kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
        Ok(()) => true,
        Err(e) => {
            debug!("Failed to send SIGINT to {}: {}", pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn send_interrupt(_pid: u32) -> bool {
    false
}

fn combine(stdout: String, stderr: String) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout,
        (true, false) => stderr,
        (false, false) => format!("{}\n{}", stdout, stderr),
    }
}

/// Drain a child pipe into a string, optionally echoing each line.
async fn collect_lines<R>(reader: Option<R>, stream: &'static str, echo: bool) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };
    let mut lines = BufReader::new(reader).lines();
    let mut output = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if echo {
            info!(stream, "{}", line);
        }
        output.push_str(&line);
        output.push('\n');
    }
    output
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn is_available(&self, program: &str) -> RunnerResult<bool> {
        let status = Command::new(program)
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        Ok(status.map(|s| s.success()).unwrap_or(false))
    }

    async fn run(&self, config: &CommandConfig, run_config: &RunConfig) -> RunnerResult<ExecutionResult> {
        self.execute(config, run_config, &CancelSignal::never()).await
    }

    async fn run_until(
        &self,
        config: &CommandConfig,
        run_config: &RunConfig,
        cancel: &CancelSignal,
    ) -> RunnerResult<ExecutionResult> {
        self.execute(config, run_config, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let runner = ProcessRunner::new();
        let config = CommandConfig::new("infracheck-missing-program-xyz");

        let err = runner.run(&config, &RunConfig::default()).await.unwrap_err();
        assert!(matches!(err, RunnerError::ProgramNotAvailable(_)));
        assert!(!runner.is_available("infracheck-missing-program-xyz").await.unwrap());
    }

    #[tokio::test]
    async fn test_already_cancelled_does_not_spawn() {
        let (trigger, signal) = CancelSignal::pair();
        trigger.cancel();

        let config = CommandConfig::new("infracheck-missing-program-xyz");
        let err = ProcessRunner::new()
            .run_until(&config, &RunConfig::default(), &signal)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Interrupted(ref out) if out.is_empty()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let runner = ProcessRunner::new();
        let config = CommandConfig::new("sh")
            .arg("-c")
            .arg("echo out; echo err 1>&2; exit 3");

        let result = runner.run(&config, &RunConfig::default()).await.unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert!(!result.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_and_workdir_are_applied() {
        let dir = std::env::temp_dir();
        let runner = ProcessRunner::new();
        let config = CommandConfig::new("sh")
            .arg("-c")
            .arg("echo $INFRACHECK_TEST_VAR")
            .workdir(&dir)
            .env("INFRACHECK_TEST_VAR", "hello");

        let result = runner.run(&config, &RunConfig::default()).await.unwrap();
        assert_eq!(result.stdout.trim(), "hello");
    }

    /// Wait until the script has installed its trap and touched `marker`.
    #[cfg(unix)]
    async fn wait_for_marker(marker: &std::path::Path) {
        while !marker.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_interrupts_before_killing() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ready");
        let script = "trap 'echo saved > state; echo stopping; exit 130' INT; \
                      sleep 30 >/dev/null 2>&1 & pid=$!; touch ready; wait $pid";
        let config = CommandConfig::new("sh").arg("-c").arg(script).workdir(dir.path());

        let runner = ProcessRunner::new().with_interrupt_grace(Duration::from_secs(10));
        let (trigger, signal) = CancelSignal::pair();

        let started = Instant::now();
        let (result, ()) = tokio::join!(runner.run_until(&config, &RunConfig::default(), &signal), async {
            wait_for_marker(&marker).await;
            trigger.cancel();
        });

        let err = result.unwrap_err();
        assert!(matches!(err, RunnerError::Interrupted(ref out) if out.contains("stopping")));
        assert!(dir.path().join("state").exists(), "interrupt handler should have run");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_ignoring_interrupt_is_killed_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ready");
        let script = "trap '' INT; touch ready; sleep 30 >/dev/null 2>&1";
        let config = CommandConfig::new("sh").arg("-c").arg(script).workdir(dir.path());

        let runner = ProcessRunner::new().with_interrupt_grace(Duration::from_millis(200));
        let (trigger, signal) = CancelSignal::pair();

        let started = Instant::now();
        let (result, ()) = tokio::join!(runner.run_until(&config, &RunConfig::default(), &signal), async {
            wait_for_marker(&marker).await;
            trigger.cancel();
        });

        assert!(matches!(result, Err(RunnerError::Interrupted(_))));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_interrupts_child() {
        let dir = tempfile::tempdir().unwrap();
        let script = "trap 'echo saved > state; exit 130' INT; sleep 30 >/dev/null 2>&1 & wait $!";
        let config = CommandConfig::new("sh").arg("-c").arg(script).workdir(dir.path());

        let runner = ProcessRunner::new().with_interrupt_grace(Duration::from_secs(10));
        let err = runner
            .run(&config, &RunConfig::default().timeout(1))
            .await
            .unwrap_err();

        assert!(matches!(err, RunnerError::Timeout(1)));
        assert!(dir.path().join("state").exists());
    }
}
