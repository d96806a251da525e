//! Collaborator clients for Fleetbroker.
//!
//! Provides the traits the broker and the fleet upgrader depend on, plus
//! their production implementations:
//! - [`DirectorClient`]: tasks, errands and deployments on the director
//! - [`RegistryClient`]: paginated instance discovery and quota counts
//! - [`AdapterClient`]: manifest generation via an external executable
//! - [`BrokerClient`]: the broker's own upgrade and last-operation endpoints

pub mod adapter;
pub mod broker;
pub mod director;
pub mod error;
pub mod http;
pub mod registry;

pub use adapter::{AdapterClient, GenerateManifestRequest, GeneratedManifest, ManifestGenerator};
pub use broker::{BrokerApi, BrokerClient, TriggerResponse};
pub use director::{Director, DirectorClient};
pub use error::ClientError;
pub use http::{Auth, HttpClient};
pub use registry::{Registry, RegistryClient};
