//! Fleetbroker Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - HTTP clients or servers
//! - Subprocesses
//! - Runtime specifics
//!
//! All types here describe service instances, the director tasks that back
//! them, and the operation metadata handed back to the marketplace.

pub mod error;
pub mod ids;
pub mod instance;
pub mod operation;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{ContextId, InstanceId, RequestId, TaskId};
pub use instance::{
    InstanceFilter, InstanceRecord, InstanceState, RegistryLastOperation, ServiceInstance,
};
pub use operation::{OperationMetadata, OperationType};
pub use status::{LastOperation, LastOperationState};
pub use task::{RemoteTask, TaskOutput, TaskState};

/// Prefix applied to an instance id to form its director deployment name.
pub const DEPLOYMENT_PREFIX: &str = "service-instance_";

/// Director deployment name for a service instance.
pub fn deployment_name(instance_id: &InstanceId) -> String {
    format!("{}{}", DEPLOYMENT_PREFIX, instance_id)
}
