//! Broker errors.

use thiserror::Error;

use fleetbroker_clients::ClientError;
use fleetbroker_core::CoreError;

use crate::failure::FailureDescription;
use crate::quota::QuotaDenialReason;

/// Errors surfaced by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Operation data could not be used.
    #[error(transparent)]
    OperationData(#[from] CoreError),

    /// The director could not be reached or refused the request.
    #[error("director unavailable: {0}")]
    DirectorUnavailable(#[source] ClientError),

    /// The registry could not be reached or refused the request.
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(#[source] ClientError),

    /// A plan or service quota would be exceeded.
    #[error("{0}")]
    QuotaExceeded(QuotaDenialReason),

    /// The adapter failed to render a manifest.
    #[error("adapter invocation failed: {source}")]
    AdapterInvocation {
        failure: FailureDescription,
        #[source]
        source: ClientError,
    },

    /// The adapter rendered something that is not a manifest for this deployment.
    #[error("adapter produced an invalid manifest: {reason}")]
    InvalidManifest {
        failure: FailureDescription,
        reason: String,
    },

    /// A chained errand is needed but none is configured.
    #[error("no errand configured for plan '{plan_id}'")]
    ErrandNotConfigured {
        failure: FailureDescription,
        plan_id: String,
    },

    /// Another operation is running against the deployment.
    #[error("An operation is in progress for your service instance. Please try again later.")]
    OperationInProgress,

    /// The registry does not know the instance.
    #[error("instance does not exist")]
    InstanceNotFound,

    /// The director has no deployment for the instance.
    #[error("deployment does not exist")]
    DeploymentNotFound,

    /// A deployment already exists for the instance.
    #[error("instance already exists")]
    InstanceAlreadyExists,

    /// The plan is not in the catalog.
    #[error("plan '{0}' is not in the catalog")]
    UnknownPlan(String),
}

impl BrokerError {
    /// Text safe to return to the marketplace.
    pub fn user_description(&self) -> String {
        match self {
            Self::OperationData(_) => "Operation data could not be decoded".to_string(),
            Self::DirectorUnavailable(_) => {
                "Currently unable to reach the director. Please try again later.".to_string()
            }
            Self::RegistryUnavailable(_) => {
                "Currently unable to reach the registry. Please try again later.".to_string()
            }
            Self::AdapterInvocation { failure, .. }
            | Self::InvalidManifest { failure, .. }
            | Self::ErrandNotConfigured { failure, .. } => failure.to_string(),
            other => other.to_string(),
        }
    }
}
