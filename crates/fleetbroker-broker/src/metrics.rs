//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use fleetbroker_core::{LastOperationState, OperationType};

const OPERATION_TYPES: [OperationType; 4] = [
    OperationType::Create,
    OperationType::Update,
    OperationType::Delete,
    OperationType::Upgrade,
];

const RESULT_STATES: [LastOperationState; 3] = [
    LastOperationState::InProgress,
    LastOperationState::Succeeded,
    LastOperationState::Failed,
];

/// Broker counters. Monotonic for the life of the process.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    accepted: [AtomicU64; 4],
    results: [AtomicU64; 3],
    quota_rejections: AtomicU64,
}

impl BrokerMetrics {
    /// Count an operation handed to the director.
    pub fn record_accepted(&self, operation: OperationType) {
        let index = OPERATION_TYPES
            .iter()
            .position(|o| *o == operation)
            .unwrap_or_default();
        self.accepted[index].fetch_add(1, Ordering::Relaxed);
    }

    /// Count a last-operation answer.
    pub fn record_result(&self, state: LastOperationState) {
        let index = RESULT_STATES
            .iter()
            .position(|s| *s == state)
            .unwrap_or_default();
        self.results[index].fetch_add(1, Ordering::Relaxed);
    }

    /// Count a request rejected by the quota gate.
    pub fn record_quota_rejection(&self) {
        self.quota_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Format all counters as Prometheus text.
    pub fn render(&self) -> String {
        let mut output = String::new();

        writeln!(
            output,
            "# HELP fleetbroker_operations_accepted_total Operations handed to the director by type"
        )
        .ok();
        writeln!(output, "# TYPE fleetbroker_operations_accepted_total counter").ok();
        for (operation, count) in OPERATION_TYPES.iter().zip(&self.accepted) {
            writeln!(
                output,
                "fleetbroker_operations_accepted_total{{operation=\"{}\"}} {}",
                operation,
                count.load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(output).ok();
        writeln!(
            output,
            "# HELP fleetbroker_last_operation_results_total Last-operation answers by state"
        )
        .ok();
        writeln!(output, "# TYPE fleetbroker_last_operation_results_total counter").ok();
        for (state, count) in RESULT_STATES.iter().zip(&self.results) {
            writeln!(
                output,
                "fleetbroker_last_operation_results_total{{state=\"{}\"}} {}",
                state.as_str(),
                count.load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(output).ok();
        writeln!(
            output,
            "# HELP fleetbroker_quota_rejections_total Requests rejected by instance quotas"
        )
        .ok();
        writeln!(output, "# TYPE fleetbroker_quota_rejections_total counter").ok();
        writeln!(
            output,
            "fleetbroker_quota_rejections_total {}",
            self.quota_rejections.load(Ordering::Relaxed)
        )
        .ok();

        output
    }
}
