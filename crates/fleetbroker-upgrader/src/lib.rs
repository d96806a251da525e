//! Fleetbroker fleet upgrader.
//!
//! Walks every instance of a service offering and upgrades it through the
//! broker, one instance at a time, classifying how each upgrade ended.

pub mod config;
pub mod outcome;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Args, UpgraderConfig};
pub use outcome::{SweepCounters, UpgradeOutcome};
pub use scheduler::{FleetUpgradeScheduler, SchedulerConfig, SchedulerError};
