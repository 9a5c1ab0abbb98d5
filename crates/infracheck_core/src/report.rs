//! Run reports.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assertions::AssertionResult;

/// Lifecycle state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Applying,
    Applied,
    Asserting,
    TearingDown,
    Destroyed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Applying => "applying",
            RunState::Applied => "applied",
            RunState::Asserting => "asserting",
            RunState::TearingDown => "tearing_down",
            RunState::Destroyed => "destroyed",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A state change and when it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub state: RunState,
    pub at: DateTime<Utc>,
}

/// Why provisioning did not produce a usable deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionFailure {
    pub message: String,
    /// Engine output, when the engine produced any
    pub diagnostics: Option<String>,
}

/// What happened to the deployment at the end of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TeardownOutcome {
    /// No handle was ever acquired.
    #[default]
    NotNeeded,
    Destroyed,
    /// Destroy failed; resources may still exist.
    Failed {
        message: String,
        diagnostics: Option<String>,
    },
}

/// Overall verdict, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    ProvisionFailed,
    Interrupted,
    AssertionsFailed,
    TeardownFailed,
    Passed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::ProvisionFailed => "PROVISION FAILED",
            RunStatus::Interrupted => "INTERRUPTED",
            RunStatus::AssertionsFailed => "FAILED",
            RunStatus::TeardownFailed => "TEARDOWN FAILED",
            RunStatus::Passed => "PASSED",
        };
        f.write_str(s)
    }
}

/// Everything that happened during one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub unique_id: String,
    pub environment_name: String,
    pub transitions: Vec<StateTransition>,
    pub provision_error: Option<ProvisionFailure>,
    pub output_error: Option<String>,
    /// Set when the run was cancelled or timed out
    pub interruption: Option<String>,
    pub assertions: Vec<AssertionResult>,
    pub teardown: TeardownOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new(unique_id: impl Into<String>, environment_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            unique_id: unique_id.into(),
            environment_name: environment_name.into(),
            transitions: vec![StateTransition {
                state: RunState::Idle,
                at: now,
            }],
            provision_error: None,
            output_error: None,
            interruption: None,
            assertions: Vec::new(),
            teardown: TeardownOutcome::NotNeeded,
            started_at: now,
            finished_at: None,
        }
    }

    pub fn transition(&mut self, state: RunState) {
        self.transitions.push(StateTransition { state, at: Utc::now() });
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    /// Current (or final) state.
    pub fn state(&self) -> RunState {
        self.transitions.last().map(|t| t.state).unwrap_or(RunState::Idle)
    }

    /// Every state visited, in order, starting with `Idle`.
    pub fn states(&self) -> Vec<RunState> {
        self.transitions.iter().map(|t| t.state).collect()
    }

    /// Conjunction of all assertion results, provided the run got to assert
    /// at all and its outputs could be read.
    pub fn passed(&self) -> bool {
        self.provision_error.is_none()
            && self.interruption.is_none()
            && self.output_error.is_none()
            && self.assertions.iter().all(|r| r.passed)
    }

    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionResult> {
        self.assertions.iter().filter(|r| !r.passed)
    }

    pub fn teardown_failed(&self) -> bool {
        matches!(self.teardown, TeardownOutcome::Failed { .. })
    }

    pub fn status(&self) -> RunStatus {
        if self.provision_error.is_some() {
            RunStatus::ProvisionFailed
        } else if self.interruption.is_some() {
            RunStatus::Interrupted
        } else if !self.passed() {
            RunStatus::AssertionsFailed
        } else if self.teardown_failed() {
            RunStatus::TeardownFailed
        } else {
            RunStatus::Passed
        }
    }

    /// Human-readable problems, earliest first. Teardown problems come last
    /// and never replace anything before them.
    pub fn diagnostics(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(failure) = &self.provision_error {
            out.push(format!("provision error: {}", failure.message));
        }
        if let Some(reason) = &self.interruption {
            out.push(format!("interrupted: {}", reason));
        }
        if let Some(err) = &self.output_error {
            out.push(format!("outputs unavailable: {}", err));
        }
        for result in self.failed_assertions() {
            out.push(format!(
                "{}: {}",
                result.name,
                result.message.as_deref().unwrap_or("failed")
            ));
        }
        if let TeardownOutcome::Failed { message, .. } = &self.teardown {
            out.push(format!("teardown warning: {}", message));
        }
        out
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
