//! Core domain errors.

use thiserror::Error;

/// Core domain errors for Fleetbroker.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The caller polled without any operation data.
    ///
    /// Happens when a marketplace client that predates operation metadata
    /// polls a current broker.
    #[error("Operation data is missing")]
    MissingOperationData,

    /// Operation data was present but could not be decoded.
    #[error("Malformed operation data: {0}")]
    MalformedOperationData(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
