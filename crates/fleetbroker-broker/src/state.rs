//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use fleetbroker_clients::{
    AdapterClient, ClientError, Director, DirectorClient, ManifestGenerator, Registry,
    RegistryClient,
};

use crate::config::Config;
use crate::metrics::BrokerMetrics;

/// Shared application state.
pub struct AppState {
    /// Loaded configuration.
    pub config: Config,

    /// Director client.
    pub director: Arc<dyn Director>,

    /// Registry client.
    pub registry: Arc<dyn Registry>,

    /// Manifest adapter.
    pub adapter: Arc<dyn ManifestGenerator>,

    /// Process-wide counters.
    pub metrics: BrokerMetrics,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(
        config: Config,
        director: Arc<dyn Director>,
        registry: Arc<dyn Registry>,
        adapter: Arc<dyn ManifestGenerator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            director,
            registry,
            adapter,
            metrics: BrokerMetrics::default(),
        })
    }

    /// Build the production clients described by `config`.
    pub fn from_config(config: Config) -> Result<Arc<Self>, ClientError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let director = DirectorClient::new(
            &config.director.url,
            &config.director.username,
            &config.director.password,
            timeout,
        )?;
        let registry = RegistryClient::new(&config.registry.url, &config.registry.token, timeout)?;
        let adapter = AdapterClient::new(
            config.adapter.path.clone(),
            Duration::from_secs(config.adapter.timeout_secs),
        );

        Ok(Self::new(
            config,
            Arc::new(director),
            Arc::new(registry),
            Arc::new(adapter),
        ))
    }
}
