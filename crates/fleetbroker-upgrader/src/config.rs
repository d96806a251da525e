//! Command-line configuration for `upgrade-all`.

use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use fleetbroker_core::InstanceFilter;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Upgrade every instance of a service offering, one at a time.
#[derive(Parser, Debug, Clone)]
#[command(name = "upgrade-all", about = "Upgrade every service instance of an offering")]
pub struct Args {
    /// Broker base URL
    #[arg(long)]
    pub broker_url: String,

    /// Broker basic-auth username
    #[arg(long)]
    pub broker_username: String,

    /// Broker basic-auth password
    #[arg(long)]
    pub broker_password: String,

    /// Registry base URL
    #[arg(long)]
    pub registry_url: String,

    /// Registry bearer token
    #[arg(long, default_value = "")]
    pub registry_token: String,

    /// Service offering whose instances are upgraded
    #[arg(long)]
    pub service_offering_id: String,

    /// Only upgrade instances in this organization
    #[arg(long)]
    pub org: Option<String>,

    /// Only upgrade instances in this space (requires --org)
    #[arg(long)]
    pub space: Option<String>,

    /// Seconds between polls
    #[arg(long, default_value = "60")]
    pub polling_interval: u64,

    /// Polls allowed while another operation blocks an upgrade
    #[arg(long, default_value = "5")]
    pub attempt_limit: u32,

    /// Seconds before an HTTP request times out
    #[arg(long, default_value = "30")]
    pub request_timeout: u64,
}

/// Validated sweep settings.
#[derive(Debug, Clone)]
pub struct UpgraderConfig {
    pub broker_url: String,
    pub broker_username: String,
    pub broker_password: String,
    pub registry_url: String,
    pub registry_token: String,
    pub service_offering_id: String,
    pub filter: InstanceFilter,
    pub polling_interval: Duration,
    pub attempt_limit: u32,
    pub request_timeout: Duration,
}

impl TryFrom<Args> for UpgraderConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.space.is_some() && args.org.is_none() {
            return Err(ConfigError::Invalid("--space requires --org".to_string()));
        }
        if args.attempt_limit == 0 {
            return Err(ConfigError::Invalid(
                "--attempt-limit must be at least 1".to_string(),
            ));
        }
        if args.service_offering_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "--service-offering-id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            broker_url: args.broker_url,
            broker_username: args.broker_username,
            broker_password: args.broker_password,
            registry_url: args.registry_url,
            registry_token: args.registry_token,
            service_offering_id: args.service_offering_id,
            filter: InstanceFilter {
                org_name: args.org,
                space_name: args.space,
            },
            polling_interval: Duration::from_secs(args.polling_interval),
            attempt_limit: args.attempt_limit,
            request_timeout: Duration::from_secs(args.request_timeout),
        })
    }
}
