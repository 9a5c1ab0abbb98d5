//! # infracheck_runner
//!
//! Command execution and retry primitives for infracheck.
//!
//! The harness never links against an infrastructure engine directly. It drives
//! external tools (Terraform by default) as child processes, and it waits for
//! eventually-consistent resources with a fixed-delay retry loop. Both concerns
//! live here so the engine and the assertions share them.
//!
//! # Features
//!
//! - **Process Runner**: async child-process execution with timeout, output capture
//!   and graceful interruption
//! - **Cancellation**: `CancelSignal` lets a caller ask a running command to stop
//! - **Mock Runner**: scripted responses and call capture for tests
//! - **Retry Evaluator**: bounded, fixed-delay retry of any fallible async probe
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use infracheck_runner::{retry_until_success, CommandConfig, CommandRunner, ProcessRunner, RetryPolicy, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = ProcessRunner::new();
//!     let config = CommandConfig::new("terraform").arg("version");
//!     let result = runner.run(&config, &RunConfig::default()).await?;
//!     println!("Exit code: {}", result.exit_code);
//!
//!     let policy = RetryPolicy::new(3, Duration::from_secs(1))?;
//!     let value = retry_until_success("ping", &policy, || async { Ok::<_, String>(42) }).await?;
//!     assert_eq!(value, 42);
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod mock;
pub mod process;
pub mod retry;
pub mod runner;

pub use cancel::{CancelSignal, CancelTrigger};
pub use config::{CommandConfig, RunConfig};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use process::{ProcessRunner, DEFAULT_INTERRUPT_GRACE};
pub use retry::{retry_until_success, retry_with_retryable_errors, RetryError, RetryPolicy};
pub use runner::{CommandRunner, ExecutionResult};
