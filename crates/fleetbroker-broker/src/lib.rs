//! Fleetbroker Broker Library
//!
//! This crate provides the service broker: instance lifecycle operations,
//! last-operation resolution with errand sequencing, instance quotas and the
//! HTTP surface the marketplace and operators talk to.

pub mod config;
pub mod error;
pub mod failure;
pub mod http;
pub mod metrics;
pub mod quota;
pub mod resolver;
mod sequencer;
pub mod service;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::BrokerError;
pub use failure::FailureDescription;
pub use quota::{QuotaDecision, QuotaDenialReason, QuotaGate};
pub use resolver::LastOperationResolver;
pub use service::InstanceService;
pub use state::AppState;
