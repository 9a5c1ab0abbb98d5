//! # infracheck_core
//!
//! Validation-and-lifecycle core of infracheck.
//!
//! A run provisions an environment through an [`infracheck_iac::InfraEngine`],
//! checks the live resources with an [`AssertionSet`], and always tears the
//! environment down again.
//!
//! # Architecture
//!
//! - **Assertions**: named, independent checks over outputs and live resources
//! - **Lifecycle**: the state machine that guarantees teardown
//! - **Probes**: connectivity checks for endpoints that come up late
//! - **Config**: YAML harness file mapped to a deployment request
//! - **Report**: per-run record of states, results and teardown outcome
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use infracheck_core::{AssertionSet, HarnessConfig, LifecycleController, TcpProbe};
//!
//! let config = HarnessConfig::load(Path::new("harness.yaml"))?;
//! let assertions = AssertionSet::standard(&config.checks, Arc::new(TcpProbe::new()));
//! let controller = LifecycleController::new(engine, inspector, assertions, config);
//!
//! let report = controller.run(&mut rand::thread_rng()).await;
//! assert!(report.passed(), "{:?}", report.diagnostics());
//! ```

pub mod assertions;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod probe;
pub mod report;
pub mod unique_id;

pub use assertions::{
    Assertion, AssertionContext, AssertionResult, AssertionSet, CheckError, EvaluationMode, OutputNames,
    StandardChecks,
};
pub use config::HarnessConfig;
pub use error::{CoreError, CoreResult};
pub use lifecycle::LifecycleController;
pub use probe::{ConnectivityProbe, ProbeError, StaticProbe, TcpProbe};
pub use report::{ProvisionFailure, RunReport, RunState, RunStatus, StateTransition, TeardownOutcome};
pub use unique_id::{environment_name, generate_unique_id};
