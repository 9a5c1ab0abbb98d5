//! Infrastructure engine contract.

use async_trait::async_trait;
use infracheck_runner::CancelSignal;
use thiserror::Error;

use crate::deployment::{DeploymentHandle, OutputSet};
use crate::error::{IacError, IacResult};
use crate::request::DeploymentRequest;

/// A failed `init_and_apply`.
///
/// When the engine got far enough to create state, `partial` holds the handle
/// that must still be destroyed.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ApplyFailure {
    pub error: IacError,
    pub partial: Option<DeploymentHandle>,
}

impl ApplyFailure {
    pub fn new(error: IacError) -> Self {
        Self { error, partial: None }
    }

    pub fn with_partial(error: IacError, handle: DeploymentHandle) -> Self {
        Self {
            error,
            partial: Some(handle),
        }
    }
}

/// Drives an external provisioning engine through apply/output/destroy.
#[async_trait]
pub trait InfraEngine: Send + Sync {
    /// Initialize the definition and apply it.
    ///
    /// When `cancel` fires the engine stops its current step gracefully and
    /// fails with [`IacError::Interrupted`], handing back whatever state it
    /// created as the partial handle.
    async fn init_and_apply(
        &self,
        request: &DeploymentRequest,
        cancel: &CancelSignal,
    ) -> Result<DeploymentHandle, ApplyFailure>;

    /// Read every output of an applied deployment.
    async fn outputs(&self, handle: &DeploymentHandle) -> IacResult<OutputSet>;

    /// Read a single output, failing with [`IacError::OutputNotFound`] if absent.
    async fn output(&self, handle: &DeploymentHandle, name: &str) -> IacResult<String> {
        let outputs = self.outputs(handle).await?;
        outputs.get(name).map(str::to_string)
    }

    /// Remove everything the engine created for `handle`.
    async fn destroy(&self, handle: DeploymentHandle) -> IacResult<()>;

    /// Locate state left behind by an interrupted `init_and_apply` for `request`.
    ///
    /// Only state that belongs to this request's environment counts. Returns
    /// `None` when nothing was created.
    async fn recover(&self, request: &DeploymentRequest) -> Option<DeploymentHandle>;
}
