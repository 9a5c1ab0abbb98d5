//! # infracheck_cloud
//!
//! Read-only inspection of live cloud resources.
//!
//! A [`ResourceInspector`] answers "what does the provider say about this
//! resource right now?". Absence is reported as [`CloudError::NotFound`], a
//! normal outcome rather than a defect.
//!
//! The AWS implementation is behind the `aws` feature; [`MockInspector`] is
//! always available for tests.

#[cfg(feature = "aws")]
pub mod aws;
pub mod descriptor;
pub mod error;
pub mod inspector;
pub mod mock;

#[cfg(feature = "aws")]
pub use aws::AwsInspector;
pub use descriptor::{attrs, ResourceDescriptor, ResourceKind};
pub use error::{CloudError, CloudResult};
pub use inspector::ResourceInspector;
pub use mock::{InspectorCall, MockInspector};
