//! In-memory resource inspector for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::descriptor::{ResourceDescriptor, ResourceKind};
use crate::error::{CloudError, CloudResult};
use crate::inspector::ResourceInspector;

/// Captured inspector call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectorCall {
    pub method: String,
    pub kind: ResourceKind,
    pub id: String,
    pub region: String,
}

/// Mock [`ResourceInspector`] backed by a map of descriptors.
///
/// Resources are looked up by `(kind, id)`; the region is recorded but only
/// matters when a resource was registered for a specific region.
#[derive(Clone, Default)]
pub struct MockInspector {
    resources: Arc<RwLock<HashMap<(ResourceKind, String), (Option<String>, ResourceDescriptor)>>>,
    provider_error: Arc<RwLock<Option<String>>>,
    calls: Arc<RwLock<Vec<InspectorCall>>>,
}

impl MockInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource visible in every region.
    pub fn with_resource(self, descriptor: ResourceDescriptor) -> Self {
        self.resources
            .write()
            .insert((descriptor.kind, descriptor.id.clone()), (None, descriptor));
        self
    }

    /// Register a resource visible only in `region`.
    pub fn with_resource_in(self, region: impl Into<String>, descriptor: ResourceDescriptor) -> Self {
        self.resources
            .write()
            .insert((descriptor.kind, descriptor.id.clone()), (Some(region.into()), descriptor));
        self
    }

    /// Replace or add a resource after construction.
    pub fn put(&self, descriptor: ResourceDescriptor) {
        self.resources
            .write()
            .insert((descriptor.kind, descriptor.id.clone()), (None, descriptor));
    }

    /// Fail every call with a provider error.
    pub fn simulate_provider_error(self, message: impl Into<String>) -> Self {
        *self.provider_error.write() = Some(message.into());
        self
    }

    pub fn get_calls(&self) -> Vec<InspectorCall> {
        self.calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }

    fn record(&self, method: &str, kind: ResourceKind, id: &str, region: &str) {
        self.calls.write().push(InspectorCall {
            method: method.to_string(),
            kind,
            id: id.to_string(),
            region: region.to_string(),
        });
    }

    fn lookup(&self, kind: ResourceKind, id: &str, region: &str) -> CloudResult<ResourceDescriptor> {
        if let Some(message) = self.provider_error.read().clone() {
            return Err(CloudError::Provider(message));
        }
        match self.resources.read().get(&(kind, id.to_string())) {
            Some((None, descriptor)) => Ok(descriptor.clone()),
            Some((Some(r), descriptor)) if r == region => Ok(descriptor.clone()),
            _ => Err(CloudError::not_found(kind, id, region)),
        }
    }
}

#[async_trait]
impl ResourceInspector for MockInspector {
    fn name(&self) -> &str {
        "mock"
    }

    async fn describe_resource(&self, kind: ResourceKind, id: &str, region: &str) -> CloudResult<ResourceDescriptor> {
        self.record("describe_resource", kind, id, region);
        self.lookup(kind, id, region)
    }

    async fn get_tags(
        &self,
        kind: ResourceKind,
        id: &str,
        region: &str,
    ) -> CloudResult<std::collections::BTreeMap<String, String>> {
        self.record("get_tags", kind, id, region);
        self.lookup(kind, id, region).map(|d| d.tags)
    }
}
