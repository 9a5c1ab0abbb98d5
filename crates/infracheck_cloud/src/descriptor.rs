//! Resource descriptors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kinds of resources the harness knows how to inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Vpc,
    SecurityGroup,
    S3Bucket,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::SecurityGroup => "security group",
            ResourceKind::S3Bucket => "s3 bucket",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known attribute names.
pub mod attrs {
    pub const CIDR_BLOCK: &str = "cidr_block";
    pub const STATE: &str = "state";
    pub const GROUP_NAME: &str = "group_name";
    pub const VPC_ID: &str = "vpc_id";
    pub const VERSIONING: &str = "versioning";
}

/// Snapshot of a live resource as reported by the provider at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    pub id: String,
    pub attributes: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            attributes: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn cidr_block(&self) -> Option<&str> {
        self.attribute(attrs::CIDR_BLOCK)
    }

    /// Bucket versioning state: `Enabled`, `Suspended` or `Disabled`.
    pub fn versioning(&self) -> Option<&str> {
        self.attribute(attrs::VERSIONING)
    }
}
