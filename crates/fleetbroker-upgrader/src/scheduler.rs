//! Fleet upgrade scheduler.
//!
//! Upgrades every instance of an offering, one at a time. For each instance
//! it waits for any operation the registry reports as running, asks the broker
//! to start an upgrade, then polls the broker until that upgrade settles.
//! Every instance ends in exactly one [`UpgradeOutcome`]; only failing to
//! enumerate the instances aborts the sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

use fleetbroker_clients::{BrokerApi, ClientError, Registry, TriggerResponse};
use fleetbroker_core::{InstanceFilter, InstanceId, LastOperationState};

use crate::config::UpgraderConfig;
use crate::outcome::{SweepCounters, UpgradeOutcome};

/// Errors that abort a sweep.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to list service instances: {0}")]
    Registry(#[source] ClientError),
}

/// Sweep settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub service_offering_id: String,
    pub filter: InstanceFilter,
    pub polling_interval: Duration,
    pub attempt_limit: u32,
}

impl From<&UpgraderConfig> for SchedulerConfig {
    fn from(config: &UpgraderConfig) -> Self {
        Self {
            service_offering_id: config.service_offering_id.clone(),
            filter: config.filter.clone(),
            polling_interval: config.polling_interval,
            attempt_limit: config.attempt_limit,
        }
    }
}

/// Whether an instance is free to upgrade.
enum Readiness {
    Ready,
    Gone,
    StillBusy,
}

/// Drives one sequential upgrade sweep.
pub struct FleetUpgradeScheduler {
    registry: Arc<dyn Registry>,
    broker: Arc<dyn BrokerApi>,
    config: SchedulerConfig,
}

impl FleetUpgradeScheduler {
    /// Create a new scheduler.
    pub fn new(
        registry: Arc<dyn Registry>,
        broker: Arc<dyn BrokerApi>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            broker,
            config,
        }
    }

    /// Upgrade every instance, stopping early once `shutdown` is set.
    pub async fn run(&self, shutdown: &AtomicBool) -> Result<SweepCounters, SchedulerError> {
        let instances = self
            .registry
            .list_instances(&self.config.service_offering_id, &self.config.filter)
            .await
            .map_err(SchedulerError::Registry)?;

        log(None, &format!("STARTING UPGRADES: {} instances", instances.len()));
        info!(
            offering_id = %self.config.service_offering_id,
            instances = instances.len(),
            "Starting upgrade sweep"
        );

        let mut counters = SweepCounters::default();
        for (index, instance) in instances.iter().enumerate() {
            if shutdown.load(Ordering::SeqCst) {
                let remaining = instances.len() - index;
                log(None, &format!("Interrupted; {} instances not processed", remaining));
                warn!(remaining = remaining, "Upgrade sweep interrupted");
                counters.interrupted = true;
                break;
            }

            let outcome = self.upgrade_one(&instance.guid).await;
            log(Some(&instance.guid), &format!("Result: {}", outcome));
            info!(instance_id = %instance.guid, outcome = %outcome, "Instance processed");
            counters.record(&instance.guid, &outcome);
        }

        Ok(counters)
    }

    /// Upgrade a single instance.
    pub async fn upgrade_one(&self, instance_id: &InstanceId) -> UpgradeOutcome {
        match self.wait_until_ready(instance_id).await {
            Ok(Readiness::Ready) => {}
            Ok(Readiness::Gone) => return UpgradeOutcome::DeletedBeforeUpgrade,
            Ok(Readiness::StillBusy) => {
                return UpgradeOutcome::Failed(format!(
                    "operation still in progress after {} attempts",
                    self.config.attempt_limit
                ))
            }
            Err(e) => return UpgradeOutcome::Failed(e.to_string()),
        }

        let operation_data = match self.trigger(instance_id).await {
            Ok(operation_data) => operation_data,
            Err(outcome) => return outcome,
        };

        self.await_upgrade(instance_id, &operation_data).await
    }

    /// Wait for any operation the registry reports to finish.
    async fn wait_until_ready(&self, instance_id: &InstanceId) -> Result<Readiness, ClientError> {
        for attempt in 1..=self.config.attempt_limit {
            let Some(state) = self.registry.get_instance_state(instance_id).await? else {
                log(Some(instance_id), "Instance no longer exists");
                return Ok(Readiness::Gone);
            };

            if !state.operation_in_progress {
                return Ok(Readiness::Ready);
            }

            log(
                Some(instance_id),
                &format!(
                    "Operation in progress, waiting (attempt {}/{})",
                    attempt, self.config.attempt_limit
                ),
            );
            if attempt < self.config.attempt_limit {
                sleep(self.config.polling_interval).await;
            }
        }
        Ok(Readiness::StillBusy)
    }

    /// Ask the broker to start the upgrade, backing off while the director
    /// is busy with other work.
    async fn trigger(&self, instance_id: &InstanceId) -> Result<String, UpgradeOutcome> {
        for attempt in 1..=self.config.attempt_limit {
            let response = self.broker.upgrade_instance(instance_id).await.map_err(|e| {
                error!(instance_id = %instance_id, error = %e, "Upgrade trigger failed");
                UpgradeOutcome::Failed(e.to_string())
            })?;

            match response {
                TriggerResponse::Accepted { operation_data } => {
                    log(Some(instance_id), "Upgrade started");
                    return Ok(operation_data);
                }
                TriggerResponse::InstanceNotFound => {
                    log(Some(instance_id), "Instance deleted before upgrade");
                    return Err(UpgradeOutcome::DeletedBeforeUpgrade);
                }
                TriggerResponse::OrphanDeployment => {
                    log(Some(instance_id), "Deployment does not exist");
                    return Err(UpgradeOutcome::OrphanedDeployment);
                }
                TriggerResponse::OperationInProgress => {
                    log(
                        Some(instance_id),
                        &format!(
                            "Another operation is running, retrying (attempt {}/{})",
                            attempt, self.config.attempt_limit
                        ),
                    );
                    if attempt < self.config.attempt_limit {
                        sleep(self.config.polling_interval).await;
                    }
                }
            }
        }

        Err(UpgradeOutcome::Failed(format!(
            "operation still in progress after {} attempts",
            self.config.attempt_limit
        )))
    }

    /// Poll the broker until the upgrade settles.
    async fn await_upgrade(&self, instance_id: &InstanceId, operation_data: &str) -> UpgradeOutcome {
        loop {
            let last_operation = match self.broker.last_operation(instance_id, operation_data).await
            {
                Ok(last_operation) => last_operation,
                Err(e) => {
                    error!(instance_id = %instance_id, error = %e, "Polling last operation failed");
                    return UpgradeOutcome::Failed(e.to_string());
                }
            };

            match last_operation.state {
                LastOperationState::Succeeded => return UpgradeOutcome::Upgraded,
                LastOperationState::Failed => {
                    return UpgradeOutcome::Failed(last_operation.description)
                }
                LastOperationState::InProgress => {
                    log(Some(instance_id), &last_operation.description);
                    sleep(self.config.polling_interval).await;
                }
            }
        }
    }
}

/// Write one line of the human-readable sweep log.
fn log(instance_id: Option<&InstanceId>, message: &str) {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    match instance_id {
        Some(id) => println!("[upgrade-all] {} [{}] {}", now, id, message),
        None => println!("[upgrade-all] {} {}", now, message),
    }
}
