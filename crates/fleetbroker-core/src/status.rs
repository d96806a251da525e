//! Last-operation status reported to the marketplace.

use serde::{Deserialize, Serialize};

/// Three-state result of a last-operation poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LastOperationState {
    /// Still running; poll again.
    #[serde(rename = "in progress")]
    InProgress,
    /// Finished successfully.
    #[serde(rename = "succeeded")]
    Succeeded,
    /// Finished unsuccessfully.
    #[serde(rename = "failed")]
    Failed,
}

impl LastOperationState {
    /// Returns true if polling can stop.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Last-operation response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastOperation {
    /// Current state.
    pub state: LastOperationState,

    /// Human-readable description, safe to show to end users.
    #[serde(default)]
    pub description: String,
}

impl LastOperation {
    /// Operation still running.
    pub fn in_progress(description: impl Into<String>) -> Self {
        Self {
            state: LastOperationState::InProgress,
            description: description.into(),
        }
    }

    /// Operation finished successfully.
    pub fn succeeded(description: impl Into<String>) -> Self {
        Self {
            state: LastOperationState::Succeeded,
            description: description.into(),
        }
    }

    /// Operation failed.
    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            state: LastOperationState::Failed,
            description: description.into(),
        }
    }
}
