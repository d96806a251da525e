//! Error types for the collaborator clients.

use thiserror::Error;

/// Errors that can occur when talking to the director, the registry, the
/// broker or the manifest adapter.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to build a client.
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP transport error (includes client-side timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote side answered with a status we did not expect.
    #[error("unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The adapter ran but reported a failure.
    ///
    /// `operator_message` is whatever the adapter printed on stdout; it is
    /// meant for operators and must not be shown to end users.
    #[error("adapter exited with code {exit_code}: {operator_message}")]
    Adapter {
        exit_code: i32,
        operator_message: String,
    },

    /// The adapter could not be started.
    #[error("failed to spawn adapter: {0}")]
    AdapterSpawn(#[from] std::io::Error),

    /// Timeout waiting for a subprocess.
    #[error("timed out after {0} seconds")]
    Timeout(u64),
}

impl ClientError {
    /// Returns true if the error is a 404 from the remote side.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::UnexpectedStatus { status, .. } => *status == 404,
            _ => false,
        }
    }
}
