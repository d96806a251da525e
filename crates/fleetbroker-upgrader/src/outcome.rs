//! Per-instance outcomes and the sweep summary.

use std::fmt;

use fleetbroker_core::InstanceId;

/// How the upgrade of one instance ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The upgrade ran to completion.
    Upgraded,
    /// The registry knows the instance but the director has no deployment.
    OrphanedDeployment,
    /// The instance was deleted before it could be upgraded.
    DeletedBeforeUpgrade,
    /// The upgrade did not complete.
    Failed(String),
}

impl fmt::Display for UpgradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upgraded => f.write_str("upgraded"),
            Self::OrphanedDeployment => f.write_str("orphaned deployment"),
            Self::DeletedBeforeUpgrade => f.write_str("deleted before upgrade"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepCounters {
    pub succeeded: usize,
    pub orphaned: usize,
    pub deleted: usize,
    pub failed: usize,
    /// One entry per failed instance.
    pub failures: Vec<String>,
    /// The sweep stopped before visiting every instance.
    pub interrupted: bool,
}

impl SweepCounters {
    /// Count one instance's outcome.
    pub fn record(&mut self, instance_id: &InstanceId, outcome: &UpgradeOutcome) {
        match outcome {
            UpgradeOutcome::Upgraded => self.succeeded += 1,
            UpgradeOutcome::OrphanedDeployment => self.orphaned += 1,
            UpgradeOutcome::DeletedBeforeUpgrade => self.deleted += 1,
            UpgradeOutcome::Failed(reason) => {
                self.failed += 1;
                self.failures
                    .push(format!("Service Instance {}: {}", instance_id, reason));
            }
        }
    }

    /// Instances visited so far.
    pub fn total(&self) -> usize {
        self.succeeded + self.orphaned + self.deleted + self.failed
    }

    /// Process exit code for this sweep.
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 || self.interrupted {
            1
        } else {
            0
        }
    }
}

impl fmt::Display for SweepCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[upgrade-all] FINISHED UPGRADES")?;
        writeln!(f, "Summary:")?;
        writeln!(f, "  successful upgrades: {}", self.succeeded)?;
        writeln!(f, "  orphaned deployments: {}", self.orphaned)?;
        writeln!(f, "  deleted before upgrade: {}", self.deleted)?;
        write!(f, "  failed: {}", self.failed)?;
        for failure in &self.failures {
            write!(f, "\n    {}", failure)?;
        }
        Ok(())
    }
}
