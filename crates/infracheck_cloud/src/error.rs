//! Error types for cloud inspection.

use thiserror::Error;

use crate::descriptor::ResourceKind;

/// Result type alias for inspector operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors returned by a [`crate::ResourceInspector`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    /// The resource does not exist. A normal, reportable outcome.
    #[error("{kind} {id} not found in {region}")]
    NotFound {
        kind: ResourceKind,
        id: String,
        region: String,
    },

    /// Transport, authentication or service failure.
    #[error("Cloud provider error: {0}")]
    Provider(String),
}

impl CloudError {
    pub fn not_found(kind: ResourceKind, id: impl Into<String>, region: impl Into<String>) -> Self {
        CloudError::NotFound {
            kind,
            id: id.into(),
            region: region.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound { .. })
    }
}
