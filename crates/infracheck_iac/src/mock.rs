//! Mock infrastructure engine for testing.
//!
//! Records every handle it hands out and every destroy it receives, so tests
//! can verify the "teardown count == handle-created count" property without
//! provisioning anything.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use infracheck_runner::CancelSignal;
use parking_lot::RwLock;

use crate::deployment::{DeploymentHandle, OutputSet};
use crate::engine::{ApplyFailure, InfraEngine};
use crate::error::{IacError, IacResult};
use crate::request::DeploymentRequest;

/// What `init_and_apply` should do.
#[derive(Debug, Clone)]
pub enum MockApply {
    /// Succeed after an optional delay.
    Succeed { delay: Duration },
    /// Fail; `partial` controls whether a handle is left behind.
    Fail { message: String, partial: bool },
    /// Run until cancelled, then stop and hand back the partial state.
    Hang,
    /// Ignore cancellation entirely. State counts as partially created and
    /// is only found again through `recover`.
    Unresponsive,
}

/// Mock [`InfraEngine`].
#[derive(Clone)]
pub struct MockEngine {
    apply: Arc<RwLock<MockApply>>,
    outputs: Arc<RwLock<Result<OutputSet, String>>>,
    destroy_error: Arc<RwLock<Option<String>>>,
    handles_created: Arc<AtomicUsize>,
    destroy_calls: Arc<AtomicUsize>,
    applied: Arc<RwLock<Vec<String>>>,
    destroyed: Arc<RwLock<Vec<String>>>,
    pending: Arc<RwLock<HashSet<String>>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            apply: Arc::new(RwLock::new(MockApply::Succeed { delay: Duration::ZERO })),
            outputs: Arc::new(RwLock::new(Ok(OutputSet::new()))),
            destroy_error: Arc::new(RwLock::new(None)),
            handles_created: Arc::new(AtomicUsize::new(0)),
            destroy_calls: Arc::new(AtomicUsize::new(0)),
            applied: Arc::new(RwLock::new(Vec::new())),
            destroyed: Arc::new(RwLock::new(Vec::new())),
            pending: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Outputs returned after a successful apply.
    pub fn with_outputs(self, outputs: OutputSet) -> Self {
        *self.outputs.write() = Ok(outputs);
        self
    }

    /// Make reading outputs fail.
    pub fn with_output_error(self, message: impl Into<String>) -> Self {
        *self.outputs.write() = Err(message.into());
        self
    }

    pub fn with_apply(self, apply: MockApply) -> Self {
        *self.apply.write() = apply;
        self
    }

    /// Make apply fail, leaving partial state when `partial` is set.
    pub fn failing_apply(self, message: impl Into<String>, partial: bool) -> Self {
        self.with_apply(MockApply::Fail {
            message: message.into(),
            partial,
        })
    }

    pub fn failing_destroy(self, message: impl Into<String>) -> Self {
        *self.destroy_error.write() = Some(message.into());
        self
    }

    /// Number of handles handed out, including partial ones.
    pub fn handles_created(&self) -> usize {
        self.handles_created.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    /// Environment names passed to `init_and_apply`, in call order.
    pub fn applied_environments(&self) -> Vec<String> {
        self.applied.read().clone()
    }

    /// Environment names passed to `destroy`, in call order.
    pub fn destroyed_environments(&self) -> Vec<String> {
        self.destroyed.read().clone()
    }

    fn handle_for(&self, request: &DeploymentRequest) -> DeploymentHandle {
        self.handles_created.fetch_add(1, Ordering::SeqCst);
        DeploymentHandle::new(request, request.definition_dir(), false)
    }
}

#[async_trait]
impl InfraEngine for MockEngine {
    async fn init_and_apply(
        &self,
        request: &DeploymentRequest,
        cancel: &CancelSignal,
    ) -> Result<DeploymentHandle, ApplyFailure> {
        self.applied.write().push(request.environment_name().to_string());
        let behavior = self.apply.read().clone();

        match behavior {
            MockApply::Succeed { delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(self.handle_for(request))
            }
            MockApply::Fail { message, partial } => {
                let error = IacError::ApplyFailed(message);
                if partial {
                    Err(ApplyFailure::with_partial(error, self.handle_for(request)))
                } else {
                    Err(ApplyFailure::new(error))
                }
            }
            MockApply::Hang => {
                cancel.clone().cancelled().await;
                Err(ApplyFailure::with_partial(
                    IacError::Interrupted("Interrupt received".to_string()),
                    self.handle_for(request),
                ))
            }
            MockApply::Unresponsive => {
                self.pending.write().insert(request.environment_name().to_string());
                std::future::pending().await
            }
        }
    }

    async fn outputs(&self, _handle: &DeploymentHandle) -> IacResult<OutputSet> {
        self.outputs.read().clone().map_err(IacError::OutputFailed)
    }

    async fn destroy(&self, handle: DeploymentHandle) -> IacResult<()> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        self.destroyed.write().push(handle.id().to_string());
        match self.destroy_error.read().clone() {
            Some(message) => Err(IacError::DestroyFailed(message)),
            None => Ok(()),
        }
    }

    async fn recover(&self, request: &DeploymentRequest) -> Option<DeploymentHandle> {
        if self.pending.write().remove(request.environment_name()) {
            Some(self.handle_for(request))
        } else {
            None
        }
    }
}
