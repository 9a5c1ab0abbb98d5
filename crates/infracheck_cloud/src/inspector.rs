//! Resource inspector trait.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::descriptor::{ResourceDescriptor, ResourceKind};
use crate::error::CloudResult;

/// Read-only view of live cloud resources.
///
/// Implementations never retry and never cache: every call reflects what the
/// provider reports at that moment. Compose with
/// `infracheck_runner::retry_until_success` when a resource is eventually
/// consistent.
#[async_trait]
pub trait ResourceInspector: Send + Sync {
    /// Provider name, for logs and reports.
    fn name(&self) -> &str;

    /// Describe one resource.
    async fn describe_resource(&self, kind: ResourceKind, id: &str, region: &str) -> CloudResult<ResourceDescriptor>;

    /// Fetch the tag set of one resource.
    async fn get_tags(&self, kind: ResourceKind, id: &str, region: &str) -> CloudResult<BTreeMap<String, String>> {
        Ok(self.describe_resource(kind, id, region).await?.tags)
    }
}
