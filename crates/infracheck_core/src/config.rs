//! Harness configuration.
//!
//! A YAML file describing what to provision and what to check:
//!
//! ```yaml
//! definition_dir: ../../terraform
//! region: us-east-1
//! project: docuthinker
//! environment: test
//! name_prefix: docuthinker-test
//! variables:
//!   eks_version: "1.28"
//! checks:
//!   db_attempts: 10
//!   db_delay_secs: 30
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use infracheck_iac::{DeploymentRequest, VarValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assertions::StandardChecks;
use crate::error::{CoreError, CoreResult};

/// Variable receiving the generated environment name.
pub const CLUSTER_NAME_VAR: &str = "cluster_name";
/// Variable receiving the environment label.
pub const ENVIRONMENT_VAR: &str = "environment";
/// Variable receiving the region.
pub const REGION_VAR: &str = "aws_region";
/// Environment variable the AWS provider reads its region from.
pub const REGION_ENV: &str = "AWS_DEFAULT_REGION";

/// Top-level harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Directory holding the infrastructure definitions
    pub definition_dir: PathBuf,
    pub region: String,
    /// Expected `Project` tag
    pub project: String,
    /// Expected `Environment` tag, also passed as a variable
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Prefix of generated environment names (`<prefix>-<id>`)
    pub name_prefix: String,
    #[serde(default)]
    pub variables: BTreeMap<String, VarValue>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    /// Retries of transient engine errors after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_time_between_retries")]
    pub time_between_retries_secs: u64,
    #[serde(default = "default_apply_timeout")]
    pub apply_timeout_secs: u64,
    /// Time an interrupted apply gets to stop and record its state
    #[serde(default = "default_interrupt_grace")]
    pub interrupt_grace_secs: u64,
    #[serde(default)]
    pub checks: StandardChecks,
}

fn default_environment() -> String {
    "test".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_time_between_retries() -> u64 {
    5
}

fn default_apply_timeout() -> u64 {
    3600
}

fn default_interrupt_grace() -> u64 {
    300
}

impl HarnessConfig {
    /// Configuration with defaults for everything but the essentials.
    pub fn new(
        definition_dir: impl Into<PathBuf>,
        region: impl Into<String>,
        project: impl Into<String>,
        name_prefix: impl Into<String>,
    ) -> Self {
        Self {
            definition_dir: definition_dir.into(),
            region: region.into(),
            project: project.into(),
            environment: default_environment(),
            name_prefix: name_prefix.into(),
            variables: BTreeMap::new(),
            env_vars: BTreeMap::new(),
            max_retries: default_max_retries(),
            time_between_retries_secs: default_time_between_retries(),
            apply_timeout_secs: default_apply_timeout(),
            interrupt_grace_secs: default_interrupt_grace(),
            checks: StandardChecks::default(),
        }
    }

    /// Load and validate a config file.
    ///
    /// A relative `definition_dir` is resolved against the file's directory.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound(path.display().to_string()));
        }
        debug!("Loading harness config from {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;

        if config.definition_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.definition_dir = parent.join(&config.definition_dir);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> CoreResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> CoreResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let required = [
            ("region", &self.region),
            ("project", &self.project),
            ("environment", &self.environment),
            ("name_prefix", &self.name_prefix),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::InvalidConfig(format!("{} must not be empty", field)));
            }
        }
        if self.definition_dir.as_os_str().is_empty() {
            return Err(CoreError::InvalidConfig("definition_dir must not be empty".to_string()));
        }
        if self.checks.db_attempts == 0 {
            return Err(CoreError::InvalidConfig("checks.db_attempts must be at least 1".to_string()));
        }
        if self.apply_timeout_secs == 0 {
            return Err(CoreError::InvalidConfig("apply_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.apply_timeout_secs)
    }

    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_secs(self.interrupt_grace_secs)
    }

    /// Build the request for one run.
    ///
    /// Configured variables are passed through; the environment name, label
    /// and region are injected on top of them.
    pub fn deployment_request(&self, environment_name: &str) -> DeploymentRequest {
        DeploymentRequest::new(&self.definition_dir, environment_name, &self.region)
            .with_vars(self.variables.clone())
            .with_var(CLUSTER_NAME_VAR, environment_name)
            .with_var(ENVIRONMENT_VAR, self.environment.as_str())
            .with_var(REGION_VAR, self.region.as_str())
            .with_envs(self.env_vars.clone())
            .with_env(REGION_ENV, self.region.as_str())
            .with_retries(self.max_retries, Duration::from_secs(self.time_between_retries_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
definition_dir: ../../terraform
region: us-east-1
project: docuthinker
name_prefix: docuthinker-test
variables:
  eks_version: "1.28"
  node_count: 2
checks:
  db_attempts: 4
  concurrent: true
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = HarnessConfig::from_yaml(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.environment, "test");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.time_between_retries_secs, 5);
        assert_eq!(config.apply_timeout(), Duration::from_secs(3600));
        assert_eq!(config.interrupt_grace(), Duration::from_secs(300));
        assert_eq!(config.checks.db_attempts, 4);
        assert_eq!(config.checks.db_delay_secs, 30);
        assert!(config.checks.concurrent);
        assert_eq!(config.checks.outputs.vpc_id, "vpc_id");
        assert_eq!(config.variables["eks_version"], VarValue::String("1.28".to_string()));
        assert_eq!(config.variables["node_count"], VarValue::Int(2));
    }

    #[test]
    fn test_request_injects_run_variables() {
        let mut config = HarnessConfig::from_yaml(SAMPLE).unwrap();
        config
            .variables
            .insert("cluster_name".to_string(), VarValue::from("overridden"));

        let request = config.deployment_request("docuthinker-test-abc123");
        let vars = request.variables();
        assert_eq!(vars["cluster_name"].to_string(), "docuthinker-test-abc123");
        assert_eq!(vars["environment"].to_string(), "test");
        assert_eq!(vars["aws_region"].to_string(), "us-east-1");
        assert_eq!(vars["eks_version"].to_string(), "1.28");
        assert_eq!(request.env_vars()["AWS_DEFAULT_REGION"], "us-east-1");
        assert_eq!(request.environment_name(), "docuthinker-test-abc123");
        assert_eq!(request.max_retries(), 3);
        assert_eq!(request.retry_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_validation() {
        let mut config = HarnessConfig::new("tf", "us-east-1", "proj", "proj-test");
        assert!(config.validate().is_ok());

        config.region = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("region"));

        let mut config = HarnessConfig::new("tf", "us-east-1", "proj", "proj-test");
        config.checks.db_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_resolves_definition_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.definition_dir, dir.path().join("../../terraform"));

        let missing = HarnessConfig::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(missing, CoreError::ConfigNotFound(_)));
    }
}
