//! Deployment requests.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use infracheck_runner::RetryPolicy;

/// An input variable value passed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Bool(b) => write!(f, "{}", b),
            VarValue::Int(i) => write!(f, "{}", i),
            VarValue::Float(x) => write!(f, "{}", x),
            VarValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        VarValue::String(s.to_string())
    }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self {
        VarValue::String(s)
    }
}

impl From<bool> for VarValue {
    fn from(b: bool) -> Self {
        VarValue::Bool(b)
    }
}

impl From<i64> for VarValue {
    fn from(i: i64) -> Self {
        VarValue::Int(i)
    }
}

impl From<f64> for VarValue {
    fn from(x: f64) -> Self {
        VarValue::Float(x)
    }
}

/// Everything the engine needs to provision one environment.
///
/// Built once per run with the `with_*` methods and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRequest {
    definition_dir: PathBuf,
    environment_name: String,
    region: String,
    variables: BTreeMap<String, VarValue>,
    env_vars: BTreeMap<String, String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl DeploymentRequest {
    pub fn new(
        definition_dir: impl Into<PathBuf>,
        environment_name: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            definition_dir: definition_dir.into(),
            environment_name: environment_name.into(),
            region: region.into(),
            variables: BTreeMap::new(),
            env_vars: BTreeMap::new(),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_vars(mut self, vars: impl IntoIterator<Item = (String, VarValue)>) -> Self {
        self.variables.extend(vars);
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(name.into(), value.into());
        self
    }

    pub fn with_envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env_vars.extend(vars);
        self
    }

    /// Retries of transient engine failures after the first attempt.
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn definition_dir(&self) -> &Path {
        &self.definition_dir
    }

    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn variables(&self) -> &BTreeMap<String, VarValue> {
        &self.variables
    }

    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env_vars
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Retry policy for engine commands: the first attempt plus `max_retries`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.saturating_add(1),
            delay: self.retry_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_value_rendering() {
        assert_eq!(VarValue::from("1.28").to_string(), "1.28");
        assert_eq!(VarValue::from(true).to_string(), "true");
        assert_eq!(VarValue::from(3i64).to_string(), "3");
        assert_eq!(VarValue::from(0.5).to_string(), "0.5");
    }

    #[test]
    fn test_var_value_untagged_yaml_shapes() {
        let vars: BTreeMap<String, VarValue> =
            serde_json::from_str(r#"{"a": "x", "b": 2, "c": false, "d": 1.5}"#).unwrap();

        assert_eq!(vars["a"], VarValue::String("x".into()));
        assert_eq!(vars["b"], VarValue::Int(2));
        assert_eq!(vars["c"], VarValue::Bool(false));
        assert_eq!(vars["d"], VarValue::Float(1.5));
    }

    #[test]
    fn test_request_builder() {
        let request = DeploymentRequest::new("../terraform", "docuthinker-test-abc123", "us-east-1")
            .with_var("cluster_name", "docuthinker-test-abc123")
            .with_var("eks_version", "1.28")
            .with_env("AWS_DEFAULT_REGION", "us-east-1")
            .with_retries(3, Duration::from_secs(5));

        assert_eq!(request.environment_name(), "docuthinker-test-abc123");
        assert_eq!(request.variables().len(), 2);
        assert_eq!(request.env_vars()["AWS_DEFAULT_REGION"], "us-east-1");

        let policy = request.retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let request = DeploymentRequest::new("tf", "env", "eu-west-1").with_retries(0, Duration::ZERO);
        assert_eq!(request.retry_policy().max_attempts, 1);
    }
}
