//! Director task types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ContextId, TaskId};

/// State of a director task.
///
/// The director reports states as lowercase strings. Anything this broker
/// does not know is kept verbatim in [`TaskState::Unrecognized`] so it can be
/// logged and treated as a failure rather than waited on forever.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskState {
    /// Accepted but not started.
    Queued,
    /// Running.
    Processing,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Error,
    /// Cancellation requested, still winding down.
    Cancelling,
    /// Cancelled.
    Cancelled,
    /// Timed out.
    Timeout,
    /// A state this broker does not know about.
    Unrecognized(String),
}

impl TaskState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Returns true while the director is still working on the task.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing | Self::Cancelling)
    }

    /// Returns true if the task finished successfully.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if the task ended in any state other than done.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Error | Self::Cancelled | Self::Timeout | Self::Unrecognized(_)
        )
    }
}

impl From<&str> for TaskState {
    fn from(raw: &str) -> Self {
        match raw {
            "queued" => Self::Queued,
            "processing" => Self::Processing,
            "done" => Self::Done,
            "error" => Self::Error,
            "cancelling" => Self::Cancelling,
            "cancelled" => Self::Cancelled,
            "timeout" => Self::Timeout,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl From<String> for TaskState {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<TaskState> for String {
    fn from(state: TaskState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work tracked by the director.
///
/// Always fetched fresh; the director is the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTask {
    /// Director task id.
    pub id: TaskId,

    /// Current state.
    pub state: TaskState,

    /// Correlation id, if the task was started under one.
    pub context_id: Option<ContextId>,

    /// Director-provided description (e.g. "create deployment").
    pub description: String,
}

impl RemoteTask {
    /// Create a new RemoteTask.
    pub fn new(id: TaskId, state: TaskState) -> Self {
        Self {
            id,
            state,
            context_id: None,
            description: String::new(),
        }
    }

    /// Builder method to set the context id.
    pub fn with_context(mut self, context_id: ContextId) -> Self {
        self.context_id = Some(context_id);
        self
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Result of an errand task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOutput {
    /// Exit code of the errand script.
    pub exit_code: i32,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,
}
