//! Mock command runner for testing.
//!
//! Provides a configurable mock implementation of the CommandRunner trait
//! so engine logic can be exercised without the real tools installed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::config::{CommandConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Predefined mock response for a command execution.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
        }
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub workdir: Option<PathBuf>,
}

impl CapturedCall {
    /// First argument, which for most CLIs is the subcommand.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

type Matcher = Box<dyn Fn(&CommandConfig) -> bool + Send + Sync>;

/// Mock command runner for testing.
///
/// Responses are chosen by the first matching rule registered with
/// [`MockRunner::on`]; unmatched calls consume the sequential response
/// queue, and an empty queue yields a successful empty response.
#[derive(Clone)]
pub struct MockRunner {
    /// Sequential responses for unmatched calls.
    responses: Arc<RwLock<Vec<MockResponse>>>,
    /// Index of next sequential response to return.
    response_index: Arc<AtomicUsize>,
    /// Rules keyed by matcher, each with its own response queue.
    rules: Arc<RwLock<Vec<(Matcher, Vec<MockResponse>, usize)>>>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Programs reported as unavailable.
    missing_programs: Arc<RwLock<Vec<String>>>,
    /// Simulated failure to return (as a string message for ExecutionFailed).
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(RwLock::new(Vec::new())),
            response_index: Arc::new(AtomicUsize::new(0)),
            rules: Arc::new(RwLock::new(Vec::new())),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            missing_programs: Arc::new(RwLock::new(Vec::new())),
            simulate_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Add a mock response for the next unmatched call.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    /// Set multiple sequential responses.
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        *self.responses.write() = responses;
        self
    }

    /// Respond to calls whose first argument equals `subcommand`.
    ///
    /// Responses are returned in order; the last one repeats once the queue is drained.
    pub fn on_subcommand(self, subcommand: &str, responses: Vec<MockResponse>) -> Self {
        let subcommand = subcommand.to_string();
        self.on(move |c| c.args.first() == Some(&subcommand), responses)
    }

    /// Respond to calls accepted by `matcher`.
    pub fn on<F>(self, matcher: F, responses: Vec<MockResponse>) -> Self
    where
        F: Fn(&CommandConfig) -> bool + Send + Sync + 'static,
    {
        self.rules.write().push((Box::new(matcher), responses, 0));
        self
    }

    /// Report a program as not installed.
    pub fn without_program(self, program: impl Into<String>) -> Self {
        self.missing_programs.write().push(program.into());
        self
    }

    /// Set a failure to simulate.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Get calls whose first argument equals `subcommand`.
    pub fn get_subcommand_calls(&self, subcommand: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.subcommand() == Some(subcommand))
            .cloned()
            .collect()
    }

    /// Check if a subcommand was called.
    pub fn was_called(&self, subcommand: &str) -> bool {
        self.captured_calls
            .read()
            .iter()
            .any(|c| c.subcommand() == Some(subcommand))
    }

    fn record_call(&self, config: &CommandConfig) {
        self.captured_calls.write().push(CapturedCall {
            program: config.program.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            workdir: config.workdir.clone(),
        });
    }

    /// Get the next response for a call.
    fn next_response(&self, config: &CommandConfig) -> MockResponse {
        {
            let mut rules = self.rules.write();
            if let Some((_, responses, index)) = rules.iter_mut().find(|(m, _, _)| m(config)) {
                let response = responses
                    .get(*index)
                    .or_else(|| responses.last())
                    .cloned()
                    .unwrap_or_else(|| MockResponse::success(""));
                *index += 1;
                return response;
            }
        }

        let responses = self.responses.read();
        if responses.is_empty() {
            return MockResponse::success("");
        }
        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        responses
            .get(index % responses.len())
            .cloned()
            .unwrap_or_else(|| MockResponse::success(""))
    }

    fn check_failure(&self) -> RunnerResult<()> {
        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(msg));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn is_available(&self, program: &str) -> RunnerResult<bool> {
        Ok(!self.missing_programs.read().iter().any(|p| p == program))
    }

    async fn run(&self, config: &CommandConfig, _run_config: &RunConfig) -> RunnerResult<ExecutionResult> {
        self.record_call(config);
        self.check_failure()?;

        if self.missing_programs.read().contains(&config.program) {
            return Err(RunnerError::ProgramNotAvailable(config.program.clone()));
        }

        let response = self.next_response(config);
        let started_at = Utc::now();
        let finished_at = started_at + chrono::Duration::milliseconds(response.duration_ms as i64);

        Ok(ExecutionResult {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at,
            duration_ms: response.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelSignal;

    #[tokio::test]
    async fn test_mock_runner_basic() {
        let runner = MockRunner::new().add_response(MockResponse::success("test output"));

        let config = CommandConfig::new("terraform").arg("version");
        let result = runner.run(&config, &RunConfig::default()).await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "test output");
    }

    #[tokio::test]
    async fn test_mock_runner_captures_calls() {
        let runner = MockRunner::new();

        let config = CommandConfig::new("terraform")
            .args(["init", "-input=false"])
            .workdir("/work")
            .env("TF_IN_AUTOMATION", "1");

        let _ = runner.run(&config, &RunConfig::default()).await;

        let calls = runner.get_subcommand_calls("init");
        assert_eq!(calls.len(), 1);

        let call = &calls[0];
        assert_eq!(call.program, "terraform");
        assert_eq!(call.args, vec!["init".to_string(), "-input=false".to_string()]);
        assert_eq!(call.workdir, Some(PathBuf::from("/work")));
        assert_eq!(call.env.get("TF_IN_AUTOMATION"), Some(&"1".to_string()));
    }

    #[tokio::test]
    async fn test_mock_runner_subcommand_rules() {
        let runner = MockRunner::new()
            .on_subcommand(
                "apply",
                vec![MockResponse::failure(1, "boom"), MockResponse::success("applied")],
            )
            .add_response(MockResponse::success("fallback"));

        let apply = CommandConfig::new("terraform").arg("apply");
        let init = CommandConfig::new("terraform").arg("init");

        let r1 = runner.run(&apply, &RunConfig::default()).await.unwrap();
        assert_eq!(r1.exit_code, 1);
        let r2 = runner.run(&apply, &RunConfig::default()).await.unwrap();
        assert_eq!(r2.stdout, "applied");
        // Last rule response repeats
        let r3 = runner.run(&apply, &RunConfig::default()).await.unwrap();
        assert_eq!(r3.stdout, "applied");

        let r4 = runner.run(&init, &RunConfig::default()).await.unwrap();
        assert_eq!(r4.stdout, "fallback");
    }

    #[tokio::test]
    async fn test_mock_runner_failure_simulation() {
        let runner = MockRunner::new().simulate_failure("simulated error");
        let config = CommandConfig::new("terraform").arg("plan");

        let result = runner.run(&config, &RunConfig::default()).await;
        assert!(matches!(result, Err(RunnerError::ExecutionFailed(_))));
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_run_until_honours_cancellation() {
        let runner = MockRunner::new().add_response(MockResponse::success("applied"));
        let config = CommandConfig::new("terraform").arg("apply");

        let result = runner
            .run_until(&config, &RunConfig::default(), &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(result.stdout, "applied");

        let (trigger, signal) = CancelSignal::pair();
        trigger.cancel();
        let result = runner.run_until(&config, &RunConfig::default(), &signal).await;
        assert!(matches!(result, Err(RunnerError::Interrupted(_))));
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_runner_missing_program() {
        let runner = MockRunner::new().without_program("tofu");

        assert!(!runner.is_available("tofu").await.unwrap());
        assert!(runner.is_available("terraform").await.unwrap());

        let result = runner.run(&CommandConfig::new("tofu"), &RunConfig::default()).await;
        assert!(matches!(result, Err(RunnerError::ProgramNotAvailable(_))));
    }
}
