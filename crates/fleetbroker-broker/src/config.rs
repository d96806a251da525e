//! Broker configuration.
//!
//! Loaded from a TOML file. Every section has local-development defaults so
//! a partial file is enough to start a broker against a local director.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Broker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP bind address.
    pub bind_addr: String,

    /// Basic-auth username expected from the marketplace and operators.
    pub username: String,

    /// Basic-auth password expected from the marketplace and operators.
    pub password: String,

    /// Client-side timeout for director and registry requests (seconds).
    pub request_timeout_secs: u64,

    /// Director connection.
    pub director: DirectorConfig,

    /// Registry connection.
    pub registry: RegistryConfig,

    /// Manifest adapter.
    pub adapter: AdapterConfig,

    /// Offering and plans served by this broker.
    pub service_catalog: ServiceCatalog,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            username: "broker".to_string(),
            password: "broker".to_string(),
            request_timeout_secs: 30,
            director: DirectorConfig::default(),
            registry: RegistryConfig::default(),
            adapter: AdapterConfig::default(),
            service_catalog: ServiceCatalog::default(),
        }
    }
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate config from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_catalog.id.is_empty() {
            return Err(ConfigError::Invalid(
                "service_catalog.id must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for plan in &self.service_catalog.plans {
            if !seen.insert(plan.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate plan id '{}'",
                    plan.id
                )));
            }
        }
        Ok(())
    }
}

/// Director connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:25555".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
        }
    }
}

/// Registry connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
    pub token: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9022".to_string(),
            token: String::new(),
        }
    }
}

/// Manifest adapter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Path to the adapter executable.
    pub path: String,

    /// Upper bound on one adapter invocation (seconds).
    pub timeout_secs: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            path: "service-adapter".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Instance limit. `None` means unlimited; `Some(0)` allows no instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotas {
    #[serde(default)]
    pub service_instance_limit: Option<usize>,
}

/// Errands chained to deployment operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleErrands {
    /// Run after a deploy finishes.
    #[serde(default)]
    pub post_deploy: Option<String>,

    /// Run before a deployment is deleted.
    #[serde(default)]
    pub pre_delete: Option<String>,
}

/// A plan of the offering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Unique plan id.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Plan-level instance limit.
    #[serde(default)]
    pub quotas: Quotas,

    /// Errands chained to operations on this plan.
    #[serde(default)]
    pub lifecycle_errands: LifecycleErrands,

    /// Free-form properties handed to the adapter.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Plan {
    /// Create a plan with no quota and no errands.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            quotas: Quotas::default(),
            lifecycle_errands: LifecycleErrands::default(),
            properties: Map::new(),
        }
    }

    /// Builder method to set the plan-level instance limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.quotas.service_instance_limit = Some(limit);
        self
    }

    /// Builder method to set the post-deploy errand.
    pub fn with_post_deploy(mut self, errand: impl Into<String>) -> Self {
        self.lifecycle_errands.post_deploy = Some(errand.into());
        self
    }

    /// Builder method to set the pre-delete errand.
    pub fn with_pre_delete(mut self, errand: impl Into<String>) -> Self {
        self.lifecycle_errands.pre_delete = Some(errand.into());
        self
    }

    /// JSON document handed to the adapter.
    pub fn to_adapter_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// The offering served by this broker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceCatalog {
    /// Offering id as registered with the marketplace.
    pub id: String,

    /// Offering name, quoted in failure descriptions.
    pub name: String,

    /// Offering-wide instance limit.
    pub global_quotas: Quotas,

    /// Plans.
    pub plans: Vec<Plan>,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self {
            id: "fleetbroker-service".to_string(),
            name: "fleetbroker-service".to_string(),
            global_quotas: Quotas::default(),
            plans: Vec::new(),
        }
    }
}

impl ServiceCatalog {
    /// Look up a plan by id.
    pub fn plan(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == plan_id)
    }
}
