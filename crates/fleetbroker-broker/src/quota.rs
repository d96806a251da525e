//! Instance quotas.
//!
//! Checked synchronously before a create, or an update that moves an
//! instance to another plan. A denied request never reaches the director and
//! never produces operation data.

use std::fmt;

use tracing::{info, warn};

use fleetbroker_clients::Registry;

use crate::config::{Plan, ServiceCatalog};
use crate::error::BrokerError;

/// Why a quota check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDenialReason {
    /// The plan is full.
    PlanQuotaReached,
    /// The offering as a whole is full.
    ServiceQuotaReached,
}

impl fmt::Display for QuotaDenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlanQuotaReached => f.write_str(
                "The quota for this service plan has been exceeded. \
                 Please contact your Operator for help.",
            ),
            Self::ServiceQuotaReached => f.write_str(
                "The quota for this service has been exceeded. \
                 Please contact your Operator for help.",
            ),
        }
    }
}

/// Result of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// The instance may be created.
    Allowed,
    /// The instance would exceed a limit.
    Denied { reason: QuotaDenialReason },
}

impl QuotaDecision {
    /// Returns true if the request may proceed.
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Convert a denial into the error returned to the caller.
    pub fn into_result(self) -> Result<(), BrokerError> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied { reason } => Err(BrokerError::QuotaExceeded(reason)),
        }
    }
}

/// Compares current instance counts against configured limits.
pub struct QuotaGate<'a> {
    registry: &'a dyn Registry,
    catalog: &'a ServiceCatalog,
}

impl<'a> QuotaGate<'a> {
    /// Create a new QuotaGate.
    pub fn new(registry: &'a dyn Registry, catalog: &'a ServiceCatalog) -> Self {
        Self { registry, catalog }
    }

    /// Decide whether one more instance fits on `plan` and in the offering.
    pub async fn check(&self, plan: &Plan) -> Result<QuotaDecision, BrokerError> {
        let decision = self.check_plan(plan).await?;
        if !decision.is_allowed() {
            return Ok(decision);
        }

        if let Some(limit) = self.catalog.global_quotas.service_instance_limit {
            let count = self
                .registry
                .count_instances_of_offering(&self.catalog.id)
                .await
                .map_err(BrokerError::RegistryUnavailable)?;

            if count >= limit {
                warn!(offering_id = %self.catalog.id, count = count, limit = limit, "Service quota reached");
                return Ok(QuotaDecision::Denied {
                    reason: QuotaDenialReason::ServiceQuotaReached,
                });
            }
        }

        info!(plan_id = %plan.id, "Quota check passed");
        Ok(QuotaDecision::Allowed)
    }

    /// Decide whether an existing instance may move onto `plan`.
    ///
    /// Only the plan limit applies: the offering-wide count is unchanged by a
    /// plan change.
    pub async fn check_plan(&self, plan: &Plan) -> Result<QuotaDecision, BrokerError> {
        if let Some(limit) = plan.quotas.service_instance_limit {
            let count = self
                .registry
                .count_instances_of_plan(&self.catalog.id, &plan.id)
                .await
                .map_err(BrokerError::RegistryUnavailable)?;

            if count >= limit {
                warn!(plan_id = %plan.id, count = count, limit = limit, "Plan quota reached");
                return Ok(QuotaDecision::Denied {
                    reason: QuotaDenialReason::PlanQuotaReached,
                });
            }
        }

        Ok(QuotaDecision::Allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Quotas;
    use crate::testing::FakeRegistry;

    fn catalog(global: Option<usize>) -> ServiceCatalog {
        ServiceCatalog {
            id: "offering-1".to_string(),
            name: "redis".to_string(),
            global_quotas: Quotas {
                service_instance_limit: global,
            },
            plans: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_unlimited_plan_is_allowed() {
        let registry = FakeRegistry::default().with_plan_count("small", 1000);
        let catalog = catalog(None);
        let decision = QuotaGate::new(&registry, &catalog)
            .check(&Plan::new("small"))
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_plan_limit_reached() {
        let registry = FakeRegistry::default().with_plan_count("small", 3);
        let catalog = catalog(None);
        let gate = QuotaGate::new(&registry, &catalog);

        assert_eq!(
            gate.check(&Plan::new("small").with_limit(3)).await.unwrap(),
            QuotaDecision::Denied {
                reason: QuotaDenialReason::PlanQuotaReached
            }
        );
        assert!(gate
            .check(&Plan::new("small").with_limit(4))
            .await
            .unwrap()
            .is_allowed());
    }

    #[tokio::test]
    async fn test_zero_limit_means_none_permitted() {
        let registry = FakeRegistry::default();
        let catalog = catalog(None);
        let decision = QuotaGate::new(&registry, &catalog)
            .check(&Plan::new("small").with_limit(0))
            .await
            .unwrap();
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn test_service_limit_reached() {
        let registry = FakeRegistry::default()
            .with_plan_count("small", 1)
            .with_plan_count("large", 1);
        let catalog = catalog(Some(2));
        let decision = QuotaGate::new(&registry, &catalog)
            .check(&Plan::new("small").with_limit(10))
            .await
            .unwrap();
        assert_eq!(
            decision,
            QuotaDecision::Denied {
                reason: QuotaDenialReason::ServiceQuotaReached
            }
        );
    }

    #[tokio::test]
    async fn test_plan_change_ignores_service_limit() {
        let registry = FakeRegistry::default()
            .with_plan_count("small", 1)
            .with_plan_count("large", 1);
        let catalog = catalog(Some(2));
        let gate = QuotaGate::new(&registry, &catalog);

        assert!(gate
            .check_plan(&Plan::new("large").with_limit(10))
            .await
            .unwrap()
            .is_allowed());
        assert_eq!(
            gate.check_plan(&Plan::new("large").with_limit(1))
                .await
                .unwrap(),
            QuotaDecision::Denied {
                reason: QuotaDenialReason::PlanQuotaReached
            }
        );
    }

    #[tokio::test]
    async fn test_registry_down_is_unavailable() {
        let registry = FakeRegistry::default().down();
        let catalog = catalog(None);
        let err = QuotaGate::new(&registry, &catalog)
            .check(&Plan::new("small").with_limit(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::RegistryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_denial_message_is_fixed() {
        let err = QuotaDecision::Denied {
            reason: QuotaDenialReason::PlanQuotaReached,
        }
        .into_result()
        .unwrap_err();
        assert_eq!(
            err.user_description(),
            "The quota for this service plan has been exceeded. Please contact your Operator for help."
        );
    }
}
