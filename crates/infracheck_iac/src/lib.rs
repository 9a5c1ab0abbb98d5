//! # infracheck_iac
//!
//! Infrastructure engine contract and Terraform driver for infracheck.
//!
//! The harness treats the infrastructure definitions as an opaque directory
//! plus a variable map. This crate turns a [`DeploymentRequest`] into a live
//! environment through an [`InfraEngine`], exposes its outputs, and tears it
//! down again.
//!
//! ## Features
//!
//! - `InfraEngine` trait: init-and-apply, outputs, destroy, partial-state recovery
//! - Terraform CLI engine with retry of known transient errors
//! - Per-run working copies so concurrent runs never share state
//! - Mock engine for lifecycle tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use infracheck_iac::{DeploymentRequest, InfraEngine, TerraformEngine};
//! use infracheck_runner::{CancelSignal, ProcessRunner};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = TerraformEngine::new(Arc::new(ProcessRunner::new()))
//!     .with_work_root(std::env::temp_dir().join("infracheck"));
//!
//! let request = DeploymentRequest::new("./terraform", "infra-test-a1b2c3", "us-east-1")
//!     .with_var("cluster_name", "infra-test-a1b2c3");
//!
//! let handle = engine.init_and_apply(&request, &CancelSignal::never()).await?;
//! let vpc_id = engine.output(&handle, "vpc_id").await?;
//! println!("VPC: {}", vpc_id);
//! engine.destroy(handle).await?;
//! # Ok(())
//! # }
//! ```

pub mod deployment;
pub mod engine;
pub mod error;
pub mod mock;
pub mod request;
pub mod terraform;
pub mod workspace;

pub use deployment::{DeploymentHandle, OutputSet};
pub use engine::{ApplyFailure, InfraEngine};
pub use error::{IacError, IacResult};
pub use mock::{MockApply, MockEngine};
pub use request::{DeploymentRequest, VarValue};
pub use terraform::TerraformEngine;
