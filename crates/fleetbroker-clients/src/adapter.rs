//! Manifest adapter: an external executable that renders deployment manifests.
//!
//! The adapter is invoked once per request:
//!
//! ```text
//! <adapter> generate-manifest <deployment-json> <plan-json> <params-json> <previous-manifest> <previous-plan-json>
//! ```
//!
//! Exit code 0 means stdout holds the manifest. Any other exit code is a
//! failure; stdout then carries a message for operators and stderr is only
//! logged.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::ClientError;

/// Everything the adapter needs to render a manifest.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateManifestRequest {
    /// Director deployment name.
    pub deployment_name: String,

    /// Plan the instance should end up on.
    pub plan: Value,

    /// Arbitrary request parameters from the marketplace.
    pub request_params: Value,

    /// Manifest currently deployed, if any.
    pub previous_manifest: Option<String>,

    /// Plan the instance was on before this request, if any.
    pub previous_plan: Option<Value>,
}

/// A manifest as produced by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedManifest {
    /// Rendered manifest (YAML).
    pub manifest: String,
}

/// Anything able to render manifests.
#[async_trait]
pub trait ManifestGenerator: Send + Sync {
    /// Render a manifest for a deployment.
    async fn generate_manifest(
        &self,
        request: &GenerateManifestRequest,
    ) -> Result<GeneratedManifest, ClientError>;
}

/// Runs the adapter executable as a subprocess.
#[derive(Debug, Clone)]
pub struct AdapterClient {
    /// Path to the adapter executable.
    path: String,

    /// Upper bound on one invocation.
    timeout: Duration,
}

impl AdapterClient {
    /// Create a new adapter client.
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    fn arguments(request: &GenerateManifestRequest) -> Result<Vec<String>, ClientError> {
        let deployment = serde_json::json!({ "deployment_name": request.deployment_name });

        Ok(vec![
            "generate-manifest".to_string(),
            to_json(&deployment)?,
            to_json(&request.plan)?,
            to_json(&request.request_params)?,
            request.previous_manifest.clone().unwrap_or_default(),
            match &request.previous_plan {
                Some(plan) => to_json(plan)?,
                None => "null".to_string(),
            },
        ])
    }
}

fn to_json(value: &Value) -> Result<String, ClientError> {
    serde_json::to_string(value).map_err(|e| ClientError::Serialization(e.to_string()))
}

#[async_trait]
impl ManifestGenerator for AdapterClient {
    async fn generate_manifest(
        &self,
        request: &GenerateManifestRequest,
    ) -> Result<GeneratedManifest, ClientError> {
        info!(
            adapter = %self.path,
            deployment = %request.deployment_name,
            "Invoking adapter generate-manifest"
        );

        let mut cmd = Command::new(&self.path);
        cmd.args(Self::arguments(request)?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                error!(adapter = %self.path, "Adapter timed out");
                ClientError::Timeout(self.timeout.as_secs())
            })?
            .map_err(|e| {
                error!(adapter = %self.path, error = %e, "Failed to spawn adapter");
                ClientError::AdapterSpawn(e)
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().map(str::trim).filter(|l| !l.is_empty()) {
            warn!(stderr = %line, "Adapter stderr");
        }

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            error!(exit_code = exit_code, "Adapter generate-manifest failed");
            return Err(ClientError::Adapter {
                exit_code,
                operator_message: stdout.trim().to_string(),
            });
        }

        Ok(GeneratedManifest { manifest: stdout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> GenerateManifestRequest {
        GenerateManifestRequest {
            deployment_name: "service-instance_abc".to_string(),
            plan: json!({"id": "small"}),
            request_params: json!({"parameters": {"size": 3}}),
            previous_manifest: None,
            previous_plan: None,
        }
    }

    #[test]
    fn test_arguments_layout() {
        let args = AdapterClient::arguments(&request()).unwrap();
        assert_eq!(args[0], "generate-manifest");
        assert_eq!(args[1], r#"{"deployment_name":"service-instance_abc"}"#);
        assert_eq!(args[2], r#"{"id":"small"}"#);
        assert_eq!(args[4], "");
        assert_eq!(args[5], "null");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let adapter = AdapterClient::new("/nonexistent/adapter", Duration::from_secs(5));
        let err = adapter.generate_manifest(&request()).await.unwrap_err();
        assert!(matches!(err, ClientError::AdapterSpawn(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_adapter_error() {
        // `false` ignores its arguments and exits 1.
        let adapter = AdapterClient::new("false", Duration::from_secs(5));
        let err = adapter.generate_manifest(&request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Adapter { exit_code: 1, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_is_manifest() {
        // `echo` prints its arguments, which is enough to see stdout captured.
        let adapter = AdapterClient::new("echo", Duration::from_secs(5));
        let generated = adapter.generate_manifest(&request()).await.unwrap();
        assert!(generated.manifest.starts_with("generate-manifest"));
    }
}
