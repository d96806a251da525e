//! Broker operations behind the HTTP handlers.

pub mod instance_service;

pub use instance_service::InstanceService;
