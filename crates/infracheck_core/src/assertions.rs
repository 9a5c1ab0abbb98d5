//! Assertions over a provisioned environment.
//!
//! Each [`Assertion`] is a named, independent check. An [`AssertionSet`]
//! runs all of them, in declaration order, and never stops early: one failing
//! check does not hide the others.
//!
//! # Example
//!
//! ```rust,ignore
//! let set = AssertionSet::standard(&StandardChecks::default(), Arc::new(TcpProbe::new()));
//! let results = set.evaluate(&ctx).await;
//! assert!(results.iter().all(|r| r.passed));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use infracheck_cloud::{CloudError, ResourceInspector, ResourceKind};
use infracheck_iac::OutputSet;
use infracheck_runner::{retry_with_retryable_errors, RetryError, RetryPolicy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::probe::{ConnectivityProbe, ProbeError};

/// `arn:<partition>:iam::<12-digit account>:role/<path/name>`
pub const IAM_ROLE_ARN_PATTERN: &str = r"^arn:[a-z0-9-]+:iam::\d{12}:role/.+$";

/// Why a check failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("output '{0}' not found")]
    OutputNotFound(String),

    #[error("output '{0}' is empty")]
    EmptyOutput(String),

    #[error("{what}: expected {expected}, got {actual}")]
    Mismatch {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("{description} did not succeed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        description: String,
        attempts: u32,
        last_error: String,
    },

    #[error("{0}")]
    Unreachable(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

impl CheckError {
    fn mismatch(what: impl Into<String>, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        CheckError::Mismatch {
            what: what.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl From<CloudError> for CheckError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::NotFound { .. } => CheckError::NotFound(err.to_string()),
            CloudError::Provider(message) => CheckError::Provider(message),
        }
    }
}

/// Everything an assertion may look at.
#[derive(Clone)]
pub struct AssertionContext {
    pub outputs: OutputSet,
    pub inspector: Arc<dyn ResourceInspector>,
    pub region: String,
    pub project: String,
    pub environment: String,
}

impl AssertionContext {
    pub fn new(
        outputs: OutputSet,
        inspector: Arc<dyn ResourceInspector>,
        region: impl Into<String>,
        project: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            outputs,
            inspector,
            region: region.into(),
            project: project.into(),
            environment: environment.into(),
        }
    }

    /// A present, non-empty output value.
    pub fn output(&self, name: &str) -> Result<&str, CheckError> {
        let value = self
            .outputs
            .get(name)
            .map_err(|_| CheckError::OutputNotFound(name.to_string()))?;
        if value.trim().is_empty() {
            return Err(CheckError::EmptyOutput(name.to_string()));
        }
        Ok(value)
    }
}

/// A named, independently executable check.
#[async_trait]
pub trait Assertion: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, ctx: &AssertionContext) -> Result<(), CheckError>;
}

/// Outcome of one assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub name: String,
    pub passed: bool,
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl AssertionResult {
    pub fn pass(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: Some(message.into()),
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// How the set runs its assertions. Result order is declaration order either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    #[default]
    Sequential,
    Concurrent,
}

/// Output names the standard checks read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputNames {
    pub vpc_id: String,
    pub cluster_endpoint: String,
    pub db_endpoint: String,
    pub s3_bucket_name: String,
    pub eks_security_group_id: String,
    pub eks_cluster_role_arn: String,
    pub cloudwatch_log_group: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            vpc_id: "vpc_id".to_string(),
            cluster_endpoint: "cluster_endpoint".to_string(),
            db_endpoint: "db_endpoint".to_string(),
            s3_bucket_name: "s3_bucket_name".to_string(),
            eks_security_group_id: "eks_security_group_id".to_string(),
            eks_cluster_role_arn: "eks_cluster_role_arn".to_string(),
            cloudwatch_log_group: "cloudwatch_log_group".to_string(),
        }
    }
}

/// Parameters of the standard assertion set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardChecks {
    pub outputs: OutputNames,
    pub expected_vpc_cidr: String,
    pub eks_endpoint_marker: String,
    /// Attempts at reaching the database, including the first
    pub db_attempts: u32,
    pub db_delay_secs: u64,
    pub concurrent: bool,
}

impl Default for StandardChecks {
    fn default() -> Self {
        Self {
            outputs: OutputNames::default(),
            expected_vpc_cidr: "10.0.0.0/16".to_string(),
            eks_endpoint_marker: "eks.amazonaws.com".to_string(),
            db_attempts: 10,
            db_delay_secs: 30,
            concurrent: false,
        }
    }
}

impl StandardChecks {
    pub fn db_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.db_attempts.max(1),
            delay: Duration::from_secs(self.db_delay_secs),
        }
    }

    pub fn mode(&self) -> EvaluationMode {
        if self.concurrent {
            EvaluationMode::Concurrent
        } else {
            EvaluationMode::Sequential
        }
    }
}

/// VPC exists with the expected CIDR block.
pub struct VpcCidr {
    pub output: String,
    pub expected_cidr: String,
}

#[async_trait]
impl Assertion for VpcCidr {
    fn name(&self) -> &str {
        "vpc_cidr"
    }

    async fn check(&self, ctx: &AssertionContext) -> Result<(), CheckError> {
        let vpc_id = ctx.output(&self.output)?;
        let vpc = ctx
            .inspector
            .describe_resource(ResourceKind::Vpc, vpc_id, &ctx.region)
            .await?;
        match vpc.cidr_block() {
            Some(cidr) if cidr == self.expected_cidr => Ok(()),
            actual => Err(CheckError::mismatch(
                format!("CIDR block of {}", vpc_id),
                &self.expected_cidr,
                actual.unwrap_or("<none>"),
            )),
        }
    }
}

/// Cluster endpoint looks like a managed EKS endpoint.
pub struct ClusterEndpoint {
    pub output: String,
    pub marker: String,
}

#[async_trait]
impl Assertion for ClusterEndpoint {
    fn name(&self) -> &str {
        "cluster_endpoint"
    }

    async fn check(&self, ctx: &AssertionContext) -> Result<(), CheckError> {
        let endpoint = ctx.output(&self.output)?;
        if endpoint.contains(&self.marker) {
            Ok(())
        } else {
            Err(CheckError::mismatch(
                "cluster endpoint",
                format!("an address containing '{}'", self.marker),
                endpoint,
            ))
        }
    }
}

/// Database endpoint becomes reachable within the retry policy.
pub struct DatabaseReachable {
    pub output: String,
    pub probe: Arc<dyn ConnectivityProbe>,
    pub policy: RetryPolicy,
}

#[async_trait]
impl Assertion for DatabaseReachable {
    fn name(&self) -> &str {
        "database_reachable"
    }

    async fn check(&self, ctx: &AssertionContext) -> Result<(), CheckError> {
        let endpoint = ctx.output(&self.output)?;
        let description = format!("connect to database at {}", endpoint);
        debug!("Probing {} with {} ({})", endpoint, self.probe.name(), self.policy);

        retry_with_retryable_errors(
            &description,
            &self.policy,
            |e: &ProbeError| !matches!(e, ProbeError::InvalidTarget(_)),
            || self.probe.probe(endpoint),
        )
        .await
        .map_err(|e| match e {
            RetryError::Exhausted {
                description,
                attempts,
                last_error,
            } => CheckError::RetriesExhausted {
                description,
                attempts,
                last_error: last_error.to_string(),
            },
            RetryError::Aborted { error, .. } => CheckError::Unreachable(error.to_string()),
        })
    }
}

/// Bucket exists and has versioning enabled.
pub struct BucketVersioning {
    pub output: String,
}

#[async_trait]
impl Assertion for BucketVersioning {
    fn name(&self) -> &str {
        "s3_bucket_versioning"
    }

    async fn check(&self, ctx: &AssertionContext) -> Result<(), CheckError> {
        let bucket = ctx.output(&self.output)?;
        let descriptor = ctx
            .inspector
            .describe_resource(ResourceKind::S3Bucket, bucket, &ctx.region)
            .await?;
        match descriptor.versioning() {
            Some("Enabled") => Ok(()),
            other => Err(CheckError::mismatch(
                format!("versioning of bucket {}", bucket),
                "Enabled",
                other.unwrap_or("Disabled"),
            )),
        }
    }
}

/// Cluster security group exists.
pub struct SecurityGroupExists {
    pub output: String,
}

#[async_trait]
impl Assertion for SecurityGroupExists {
    fn name(&self) -> &str {
        "eks_security_group"
    }

    async fn check(&self, ctx: &AssertionContext) -> Result<(), CheckError> {
        let group_id = ctx.output(&self.output)?;
        ctx.inspector
            .describe_resource(ResourceKind::SecurityGroup, group_id, &ctx.region)
            .await?;
        Ok(())
    }
}

/// Cluster role output is an IAM role ARN.
pub struct ClusterRoleArn {
    pub output: String,
}

#[async_trait]
impl Assertion for ClusterRoleArn {
    fn name(&self) -> &str {
        "eks_cluster_role_arn"
    }

    async fn check(&self, ctx: &AssertionContext) -> Result<(), CheckError> {
        let arn = ctx.output(&self.output)?;
        let pattern = Regex::new(IAM_ROLE_ARN_PATTERN).map_err(|e| CheckError::InvalidPattern(e.to_string()))?;
        if pattern.is_match(arn) {
            Ok(())
        } else {
            Err(CheckError::mismatch("cluster role", "an IAM role ARN", arn))
        }
    }
}

/// Log group output is present.
pub struct LogGroupPresent {
    pub output: String,
}

#[async_trait]
impl Assertion for LogGroupPresent {
    fn name(&self) -> &str {
        "cloudwatch_log_group"
    }

    async fn check(&self, ctx: &AssertionContext) -> Result<(), CheckError> {
        ctx.output(&self.output)?;
        Ok(())
    }
}

/// VPC carries the run's `Project` and `Environment` tags.
pub struct VpcTags {
    pub output: String,
}

#[async_trait]
impl Assertion for VpcTags {
    fn name(&self) -> &str {
        "vpc_tags"
    }

    async fn check(&self, ctx: &AssertionContext) -> Result<(), CheckError> {
        let vpc_id = ctx.output(&self.output)?;
        let tags = ctx.inspector.get_tags(ResourceKind::Vpc, vpc_id, &ctx.region).await?;

        for (key, expected) in [("Project", &ctx.project), ("Environment", &ctx.environment)] {
            match tags.get(key) {
                Some(actual) if actual == expected => {}
                actual => {
                    return Err(CheckError::mismatch(
                        format!("tag {} on {}", key, vpc_id),
                        expected.as_str(),
                        actual.map(String::as_str).unwrap_or("<missing>"),
                    ))
                }
            }
        }
        Ok(())
    }
}

/// Ordered collection of assertions.
#[derive(Clone, Default)]
pub struct AssertionSet {
    assertions: Vec<Arc<dyn Assertion>>,
    mode: EvaluationMode,
}

impl AssertionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The eight checks for an EKS + database + bucket environment.
    pub fn standard(checks: &StandardChecks, db_probe: Arc<dyn ConnectivityProbe>) -> Self {
        let names = &checks.outputs;
        Self::new()
            .with_mode(checks.mode())
            .with(VpcCidr {
                output: names.vpc_id.clone(),
                expected_cidr: checks.expected_vpc_cidr.clone(),
            })
            .with(ClusterEndpoint {
                output: names.cluster_endpoint.clone(),
                marker: checks.eks_endpoint_marker.clone(),
            })
            .with(DatabaseReachable {
                output: names.db_endpoint.clone(),
                probe: db_probe,
                policy: checks.db_policy(),
            })
            .with(BucketVersioning {
                output: names.s3_bucket_name.clone(),
            })
            .with(SecurityGroupExists {
                output: names.eks_security_group_id.clone(),
            })
            .with(ClusterRoleArn {
                output: names.eks_cluster_role_arn.clone(),
            })
            .with(LogGroupPresent {
                output: names.cloudwatch_log_group.clone(),
            })
            .with(VpcTags {
                output: names.vpc_id.clone(),
            })
    }

    pub fn with(mut self, assertion: impl Assertion + 'static) -> Self {
        self.assertions.push(Arc::new(assertion));
        self
    }

    pub fn push(&mut self, assertion: Arc<dyn Assertion>) {
        self.assertions.push(assertion);
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    pub fn names(&self) -> Vec<&str> {
        self.assertions.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.assertions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assertions.is_empty()
    }

    /// Run every assertion and collect one result per assertion.
    pub async fn evaluate(&self, ctx: &AssertionContext) -> Vec<AssertionResult> {
        match self.mode {
            EvaluationMode::Sequential => {
                let mut results = Vec::with_capacity(self.assertions.len());
                for assertion in &self.assertions {
                    results.push(run_one(assertion.as_ref(), ctx).await);
                }
                results
            }
            EvaluationMode::Concurrent => join_all(self.assertions.iter().map(|a| run_one(a.as_ref(), ctx))).await,
        }
    }
}

async fn run_one(assertion: &dyn Assertion, ctx: &AssertionContext) -> AssertionResult {
    let started = Instant::now();
    let outcome = assertion.check(ctx).await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(()) => {
            info!("PASS {}", assertion.name());
            AssertionResult::pass(assertion.name(), elapsed)
        }
        Err(e) => {
            warn!("FAIL {}: {}", assertion.name(), e);
            AssertionResult::fail(assertion.name(), e.to_string(), elapsed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::StaticProbe;
    use infracheck_cloud::{attrs, MockInspector, ResourceDescriptor};

    fn context(outputs: OutputSet, inspector: MockInspector) -> AssertionContext {
        AssertionContext::new(outputs, Arc::new(inspector), "us-east-1", "docuthinker", "test")
    }

    #[tokio::test]
    async fn test_output_presence_and_emptiness() {
        let ctx = context(OutputSet::new().with("cloudwatch_log_group", "  "), MockInspector::new());

        assert_eq!(
            ctx.output("cloudwatch_log_group"),
            Err(CheckError::EmptyOutput("cloudwatch_log_group".to_string()))
        );
        assert_eq!(
            ctx.output("vpc_id"),
            Err(CheckError::OutputNotFound("vpc_id".to_string()))
        );
    }

    #[tokio::test]
    async fn test_role_arn_shape() {
        let check = ClusterRoleArn {
            output: "arn".to_string(),
        };

        let good = context(
            OutputSet::new().with("arn", "arn:aws:iam::123456789012:role/eks-cluster-role"),
            MockInspector::new(),
        );
        assert!(check.check(&good).await.is_ok());

        let gov = context(
            OutputSet::new().with("arn", "arn:aws-us-gov:iam::123456789012:role/path/to/role"),
            MockInspector::new(),
        );
        assert!(check.check(&gov).await.is_ok());

        let not_a_role = context(
            OutputSet::new().with("arn", "arn:aws:iam::123456789012:user/alice"),
            MockInspector::new(),
        );
        assert!(matches!(
            check.check(&not_a_role).await,
            Err(CheckError::Mismatch { .. })
        ));

        // Containing "arn:aws:iam" is not enough
        let substring_only = context(OutputSet::new().with("arn", "xarn:aws:iam"), MockInspector::new());
        assert!(check.check(&substring_only).await.is_err());
    }

    #[tokio::test]
    async fn test_endpoint_marker() {
        let check = ClusterEndpoint {
            output: "cluster_endpoint".to_string(),
            marker: "eks.amazonaws.com".to_string(),
        };
        let ok = context(
            OutputSet::new().with("cluster_endpoint", "https://ABC.gr7.us-east-1.eks.amazonaws.com"),
            MockInspector::new(),
        );
        assert!(check.check(&ok).await.is_ok());

        let bad = context(
            OutputSet::new().with("cluster_endpoint", "https://10.0.0.1"),
            MockInspector::new(),
        );
        assert!(check.check(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_bucket_versioning_states() {
        let check = BucketVersioning {
            output: "s3_bucket_name".to_string(),
        };
        let outputs = OutputSet::new().with("s3_bucket_name", "docs");

        let enabled = MockInspector::new()
            .with_resource(ResourceDescriptor::new(ResourceKind::S3Bucket, "docs").with_attribute(attrs::VERSIONING, "Enabled"));
        assert!(check.check(&context(outputs.clone(), enabled)).await.is_ok());

        let suspended = MockInspector::new().with_resource(
            ResourceDescriptor::new(ResourceKind::S3Bucket, "docs").with_attribute(attrs::VERSIONING, "Suspended"),
        );
        let err = check.check(&context(outputs.clone(), suspended)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "versioning of bucket docs: expected Enabled, got Suspended"
        );

        let missing = check.check(&context(outputs, MockInspector::new())).await.unwrap_err();
        assert!(matches!(missing, CheckError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_vpc_tags() {
        let check = VpcTags {
            output: "vpc_id".to_string(),
        };
        let outputs = OutputSet::new().with("vpc_id", "vpc-1");

        let tagged = MockInspector::new().with_resource(
            ResourceDescriptor::new(ResourceKind::Vpc, "vpc-1")
                .with_tag("Project", "docuthinker")
                .with_tag("Environment", "test"),
        );
        assert!(check.check(&context(outputs.clone(), tagged)).await.is_ok());

        let wrong_env = MockInspector::new().with_resource(
            ResourceDescriptor::new(ResourceKind::Vpc, "vpc-1")
                .with_tag("Project", "docuthinker")
                .with_tag("Environment", "prod"),
        );
        let err = check.check(&context(outputs, wrong_env)).await.unwrap_err();
        assert!(err.to_string().contains("tag Environment on vpc-1"));
    }

    #[tokio::test]
    async fn test_provider_error_is_reported() {
        let check = SecurityGroupExists {
            output: "sg".to_string(),
        };
        let ctx = context(
            OutputSet::new().with("sg", "sg-1"),
            MockInspector::new().simulate_provider_error("throttled"),
        );
        assert_eq!(
            check.check(&ctx).await,
            Err(CheckError::Provider("throttled".to_string()))
        );
    }

    #[tokio::test]
    async fn test_invalid_db_target_is_not_retried() {
        let check = DatabaseReachable {
            output: "db".to_string(),
            probe: Arc::new(crate::probe::TcpProbe::new()),
            policy: RetryPolicy {
                max_attempts: 10,
                delay: Duration::from_secs(30),
            },
        };
        let ctx = context(OutputSet::new().with("db", "db:not-a-port"), MockInspector::new());

        let started = Instant::now();
        let err = check.check(&ctx).await.unwrap_err();
        assert!(matches!(err, CheckError::Unreachable(_)));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn test_standard_set_order() {
        let set = AssertionSet::standard(&StandardChecks::default(), Arc::new(StaticProbe::reachable()));
        assert_eq!(
            set.names(),
            vec![
                "vpc_cidr",
                "cluster_endpoint",
                "database_reachable",
                "s3_bucket_versioning",
                "eks_security_group",
                "eks_cluster_role_arn",
                "cloudwatch_log_group",
                "vpc_tags",
            ]
        );
        assert_eq!(set.mode(), EvaluationMode::Sequential);
    }

    #[test]
    fn test_standard_checks_defaults() {
        let checks = StandardChecks::default();
        let policy = checks.db_policy();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.delay, Duration::from_secs(30));

        let zero = StandardChecks {
            db_attempts: 0,
            ..StandardChecks::default()
        };
        assert_eq!(zero.db_policy().max_attempts, 1);
    }
}
