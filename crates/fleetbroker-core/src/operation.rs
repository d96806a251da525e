//! Operation metadata and its opaque encoding.
//!
//! When the broker accepts an asynchronous request it hands the marketplace
//! an "operation data" token. The marketplace passes that token back on every
//! last-operation poll, so everything the broker needs to resolve the
//! operation later must be inside it.
//!
//! The encoding is plain JSON. Every field defaults when absent and unknown
//! fields are ignored: tokens minted by an older or newer broker release must
//! keep decoding while their operations are still being polled.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ContextId, CoreError, TaskId};

/// Kind of operation being tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Provision a new instance.
    #[default]
    Create,
    /// Update an instance (plan or parameter change).
    Update,
    /// Deprovision an instance.
    Delete,
    /// Redeploy an instance with a freshly generated manifest.
    Upgrade,
}

impl OperationType {
    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Upgrade => "upgrade",
        }
    }

    /// Noun used in human-readable progress descriptions.
    pub fn progress_noun(&self) -> &'static str {
        match self {
            Self::Create => "provisioning",
            Self::Update => "update",
            Self::Delete => "deletion",
            Self::Upgrade => "upgrade",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata about an in-flight operation, round-tripped through the
/// marketplace as opaque operation data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationMetadata {
    /// Operation being performed.
    pub operation_type: OperationType,

    /// Primary director task.
    pub task_id: TaskId,

    /// Correlation id shared with chained errand tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<ContextId>,

    /// Plan in effect when the request was accepted.
    pub plan_id: String,

    /// Errand chained to the primary task, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errand_name: Option<String>,
}

impl OperationMetadata {
    /// Create metadata for a single-task operation.
    pub fn new(operation_type: OperationType, task_id: TaskId, plan_id: impl Into<String>) -> Self {
        Self {
            operation_type,
            task_id,
            context_id: None,
            plan_id: plan_id.into(),
            errand_name: None,
        }
    }

    /// Builder method to chain an errand under a shared context id.
    pub fn with_errand(mut self, context_id: ContextId, errand_name: impl Into<String>) -> Self {
        self.context_id = Some(context_id);
        self.errand_name = Some(errand_name.into());
        self
    }

    /// Returns true if resolution has to follow a chain of tasks.
    pub fn has_errand(&self) -> bool {
        self.context_id.is_some()
    }

    /// Encode into the opaque operation data string.
    pub fn encode(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Decode opaque operation data.
    ///
    /// An empty token is reported as [`CoreError::MissingOperationData`],
    /// anything that is not a valid metadata document as
    /// [`CoreError::MalformedOperationData`].
    pub fn decode(raw: &str) -> Result<Self, CoreError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CoreError::MissingOperationData);
        }

        serde_json::from_str(raw).map_err(|e| CoreError::MalformedOperationData(e.to_string()))
    }
}
