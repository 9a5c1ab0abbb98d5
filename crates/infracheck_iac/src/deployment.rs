//! Deployment handles and output sets.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{IacError, IacResult};
use crate::request::DeploymentRequest;

/// A live (possibly partially created) environment.
///
/// Not `Clone`: [`crate::InfraEngine::destroy`] takes the handle by
/// value, so each handle can be torn down at most once.
#[derive(Debug)]
pub struct DeploymentHandle {
    request: Arc<DeploymentRequest>,
    working_dir: PathBuf,
    owns_working_dir: bool,
}

impl DeploymentHandle {
    /// Create a handle for `request` whose engine state lives in `working_dir`.
    ///
    /// `owns_working_dir` marks a per-run copy that the engine may delete after
    /// a successful destroy.
    pub fn new(request: &DeploymentRequest, working_dir: impl Into<PathBuf>, owns_working_dir: bool) -> Self {
        Self {
            request: Arc::new(request.clone()),
            working_dir: working_dir.into(),
            owns_working_dir,
        }
    }

    /// Unique environment name this handle provisions.
    pub fn id(&self) -> &str {
        self.request.environment_name()
    }

    pub fn request(&self) -> &DeploymentRequest {
        &self.request
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn owns_working_dir(&self) -> bool {
        self.owns_working_dir
    }
}

/// Named outputs of an applied deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSet {
    values: BTreeMap<String, String>,
}

/// One entry of `terraform output -json`.
#[derive(Debug, Deserialize)]
struct TerraformOutput {
    value: serde_json::Value,
}

impl OutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Parse the document printed by `terraform output -json`.
    ///
    /// String values are kept verbatim; any other value is rendered as compact JSON.
    pub fn from_terraform_json(json: &str) -> IacResult<Self> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Ok(Self::new());
        }

        let raw: BTreeMap<String, TerraformOutput> = serde_json::from_str(trimmed)?;
        let values = raw
            .into_iter()
            .map(|(name, output)| {
                let value = match output.value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect();

        Ok(Self { values })
    }

    /// Look up an output by name.
    pub fn get(&self, name: &str) -> IacResult<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| IacError::OutputNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, String)> for OutputSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TF_OUTPUT: &str = r#"{
      "vpc_id": {"sensitive": false, "type": "string", "value": "vpc-0abc123"},
      "db_endpoint": {"sensitive": true, "type": "string", "value": "db.example.internal:5432"},
      "private_subnets": {"sensitive": false, "type": ["list", "string"], "value": ["subnet-1", "subnet-2"]},
      "node_count": {"sensitive": false, "type": "number", "value": 3}
    }"#;

    #[test]
    fn test_parse_terraform_output_json() {
        let outputs = OutputSet::from_terraform_json(TF_OUTPUT).unwrap();

        assert_eq!(outputs.len(), 4);
        assert_eq!(outputs.get("vpc_id").unwrap(), "vpc-0abc123");
        assert_eq!(outputs.get("db_endpoint").unwrap(), "db.example.internal:5432");
        assert_eq!(outputs.get("private_subnets").unwrap(), r#"["subnet-1","subnet-2"]"#);
        assert_eq!(outputs.get("node_count").unwrap(), "3");
    }

    #[test]
    fn test_missing_output_is_an_error() {
        let outputs = OutputSet::new().with("vpc_id", "vpc-123");

        let err = outputs.get("cluster_endpoint").unwrap_err();
        assert!(matches!(err, IacError::OutputNotFound(ref n) if n == "cluster_endpoint"));
    }

    #[test]
    fn test_empty_document_yields_empty_set() {
        assert!(OutputSet::from_terraform_json("\n").unwrap().is_empty());
        assert!(OutputSet::from_terraform_json("{}").unwrap().is_empty());
    }

    #[test]
    fn test_handle_identity_follows_request() {
        let request = DeploymentRequest::new("tf", "infra-test-x1y2z3", "us-east-1");
        let handle = DeploymentHandle::new(&request, "/tmp/infra-test-x1y2z3", true);

        assert_eq!(handle.id(), "infra-test-x1y2z3");
        assert_eq!(handle.request().region(), "us-east-1");
        assert!(handle.owns_working_dir());
    }
}
