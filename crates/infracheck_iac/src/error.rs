//! Error types for IaC module.

use thiserror::Error;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur during IaC operations.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Terraform not available: {0}")]
    TerraformNotAvailable(String),

    #[error("Terraform init failed: {0}")]
    InitFailed(String),

    #[error("Terraform apply failed: {0}")]
    ApplyFailed(String),

    #[error("Terraform destroy failed: {0}")]
    DestroyFailed(String),

    /// Stopped on request; carries terraform's output up to that point.
    #[error("Terraform interrupted: {0}")]
    Interrupted(String),

    #[error("Reading terraform outputs failed: {0}")]
    OutputFailed(String),

    #[error("Output not found: {0}")]
    OutputNotFound(String),

    #[error("Working copy error: {0}")]
    Workspace(String),

    #[error("Runner error: {0}")]
    Runner(#[from] infracheck_runner::RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IacError {
    /// Engine output attached to a failed terraform step, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            IacError::InitFailed(out)
            | IacError::ApplyFailed(out)
            | IacError::DestroyFailed(out)
            | IacError::Interrupted(out)
            | IacError::OutputFailed(out) => Some(out),
            _ => None,
        }
    }
}
