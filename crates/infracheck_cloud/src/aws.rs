//! AWS resource inspector.
//!
//! Uses the default credential chain. One SDK configuration is loaded per
//! region and reused; resource descriptors themselves are never cached.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_ec2::config::Region;
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata};
use parking_lot::RwLock;
use tracing::debug;

use crate::descriptor::{attrs, ResourceDescriptor, ResourceKind};
use crate::error::{CloudError, CloudResult};
use crate::inspector::ResourceInspector;

/// EC2 error codes meaning "no such resource".
const EC2_NOT_FOUND_CODES: &[&str] = &[
    "InvalidVpcID.NotFound",
    "InvalidGroup.NotFound",
    "InvalidGroupId.Malformed",
    "InvalidVpcID.Malformed",
];

/// [`ResourceInspector`] backed by the AWS SDK.
#[derive(Default)]
pub struct AwsInspector {
    configs: RwLock<HashMap<String, SdkConfig>>,
}

impl AwsInspector {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sdk_config(&self, region: &str) -> SdkConfig {
        if let Some(config) = self.configs.read().get(region).cloned() {
            return config;
        }

        debug!("Loading AWS config for region {}", region);
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        self.configs.write().insert(region.to_string(), config.clone());
        config
    }

    fn ec2_error<E>(err: E, kind: ResourceKind, id: &str, region: &str) -> CloudError
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
    {
        match err.code() {
            Some(code) if EC2_NOT_FOUND_CODES.contains(&code) => CloudError::not_found(kind, id, region),
            _ => CloudError::Provider(DisplayErrorContext(&err).to_string()),
        }
    }

    async fn describe_vpc(&self, id: &str, region: &str) -> CloudResult<ResourceDescriptor> {
        let client = aws_sdk_ec2::Client::new(&self.sdk_config(region).await);
        let output = client
            .describe_vpcs()
            .vpc_ids(id)
            .send()
            .await
            .map_err(|e| Self::ec2_error(e, ResourceKind::Vpc, id, region))?;

        let vpc = output
            .vpcs()
            .first()
            .ok_or_else(|| CloudError::not_found(ResourceKind::Vpc, id, region))?;

        let mut descriptor = ResourceDescriptor::new(ResourceKind::Vpc, vpc.vpc_id().unwrap_or(id));
        if let Some(cidr) = vpc.cidr_block() {
            descriptor = descriptor.with_attribute(attrs::CIDR_BLOCK, cidr);
        }
        if let Some(state) = vpc.state() {
            descriptor = descriptor.with_attribute(attrs::STATE, state.as_str());
        }
        for tag in vpc.tags() {
            if let (Some(k), Some(v)) = (tag.key(), tag.value()) {
                descriptor = descriptor.with_tag(k, v);
            }
        }
        Ok(descriptor)
    }

    async fn describe_security_group(&self, id: &str, region: &str) -> CloudResult<ResourceDescriptor> {
        let client = aws_sdk_ec2::Client::new(&self.sdk_config(region).await);
        let output = client
            .describe_security_groups()
            .group_ids(id)
            .send()
            .await
            .map_err(|e| Self::ec2_error(e, ResourceKind::SecurityGroup, id, region))?;

        let group = output
            .security_groups()
            .first()
            .ok_or_else(|| CloudError::not_found(ResourceKind::SecurityGroup, id, region))?;

        let mut descriptor = ResourceDescriptor::new(ResourceKind::SecurityGroup, group.group_id().unwrap_or(id));
        if let Some(name) = group.group_name() {
            descriptor = descriptor.with_attribute(attrs::GROUP_NAME, name);
        }
        if let Some(vpc_id) = group.vpc_id() {
            descriptor = descriptor.with_attribute(attrs::VPC_ID, vpc_id);
        }
        for tag in group.tags() {
            if let (Some(k), Some(v)) = (tag.key(), tag.value()) {
                descriptor = descriptor.with_tag(k, v);
            }
        }
        Ok(descriptor)
    }

    async fn describe_bucket(&self, name: &str, region: &str) -> CloudResult<ResourceDescriptor> {
        let client = aws_sdk_s3::Client::new(&self.sdk_config(region).await);

        if let Err(err) = client.head_bucket().bucket(name).send().await {
            let missing = err.as_service_error().map(|e| e.is_not_found()).unwrap_or(false)
                || matches!(err.code(), Some("NotFound") | Some("NoSuchBucket"));
            return Err(if missing {
                CloudError::not_found(ResourceKind::S3Bucket, name, region)
            } else {
                CloudError::Provider(DisplayErrorContext(&err).to_string())
            });
        }

        let versioning = client
            .get_bucket_versioning()
            .bucket(name)
            .send()
            .await
            .map_err(|e| CloudError::Provider(DisplayErrorContext(&e).to_string()))?;
        let status = versioning.status().map(|s| s.as_str()).unwrap_or("Disabled");

        let mut descriptor =
            ResourceDescriptor::new(ResourceKind::S3Bucket, name).with_attribute(attrs::VERSIONING, status);

        match client.get_bucket_tagging().bucket(name).send().await {
            Ok(tagging) => {
                for tag in tagging.tag_set() {
                    descriptor = descriptor.with_tag(tag.key(), tag.value());
                }
            }
            // A bucket without tags answers NoSuchTagSet.
            Err(err) if err.code() == Some("NoSuchTagSet") => {}
            Err(err) => return Err(CloudError::Provider(DisplayErrorContext(&err).to_string())),
        }

        Ok(descriptor)
    }
}

#[async_trait]
impl ResourceInspector for AwsInspector {
    fn name(&self) -> &str {
        "aws"
    }

    async fn describe_resource(&self, kind: ResourceKind, id: &str, region: &str) -> CloudResult<ResourceDescriptor> {
        debug!("Describing {} {} in {}", kind, id, region);
        match kind {
            ResourceKind::Vpc => self.describe_vpc(id, region).await,
            ResourceKind::SecurityGroup => self.describe_security_group(id, region).await,
            ResourceKind::S3Bucket => self.describe_bucket(id, region).await,
        }
    }

    async fn get_tags(&self, kind: ResourceKind, id: &str, region: &str) -> CloudResult<BTreeMap<String, String>> {
        Ok(self.describe_resource(kind, id, region).await?.tags)
    }
}
