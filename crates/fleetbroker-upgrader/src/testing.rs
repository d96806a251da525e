//! In-memory registry and broker for sweep tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use fleetbroker_clients::{BrokerApi, ClientError, Registry, TriggerResponse};
use fleetbroker_core::{
    InstanceFilter, InstanceId, InstanceRecord, InstanceState, LastOperation,
    RegistryLastOperation, ServiceInstance,
};

fn connection_error(what: &str) -> ClientError {
    ClientError::Connection(format!("{} unavailable", what))
}

/// Registry listing instances in insertion order.
#[derive(Default)]
pub struct FakeRegistry {
    listed: Vec<InstanceId>,
    /// Remaining polls reporting an operation in progress, per existing instance.
    busy_polls: Mutex<HashMap<InstanceId, u32>>,
    /// Instances deleted once their busy polls run out.
    deleted_after_busy: HashSet<InstanceId>,
    down: bool,
}

impl FakeRegistry {
    pub fn with_idle(self, guid: &str) -> Self {
        self.with_busy(guid, 0)
    }

    /// Reports an operation in progress for the first `polls` lookups.
    pub fn with_busy(mut self, guid: &str, polls: u32) -> Self {
        let id = InstanceId::new(guid);
        self.listed.push(id.clone());
        self.busy_polls.lock().unwrap().insert(id, polls);
        self
    }

    /// Reports an operation in progress for `polls` lookups, then 404.
    pub fn with_busy_then_gone(mut self, guid: &str, polls: u32) -> Self {
        self.deleted_after_busy.insert(InstanceId::new(guid));
        self.with_busy(guid, polls)
    }

    /// Listed, but gone by the time it is looked up.
    pub fn listing_missing(mut self, guid: &str) -> Self {
        self.listed.push(InstanceId::new(guid));
        self
    }

    pub fn down(mut self) -> Self {
        self.down = true;
        self
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn list_instances(
        &self,
        _offering_id: &str,
        _filter: &InstanceFilter,
    ) -> Result<Vec<ServiceInstance>, ClientError> {
        if self.down {
            return Err(connection_error("registry"));
        }
        Ok(self
            .listed
            .iter()
            .map(|guid| ServiceInstance {
                guid: guid.clone(),
                plan_id: "small".to_string(),
            })
            .collect())
    }

    async fn get_instance_state(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<InstanceState>, ClientError> {
        Ok(self.get_instance(instance_id).await?.map(|record| InstanceState {
            operation_in_progress: record.operation_in_progress(),
            plan_id: record.plan_id,
        }))
    }

    async fn get_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<InstanceRecord>, ClientError> {
        let mut busy_polls = self.busy_polls.lock().unwrap();
        let Some(remaining) = busy_polls.get_mut(instance_id) else {
            return Ok(None);
        };

        let state = if *remaining > 0 {
            *remaining -= 1;
            "in progress"
        } else if self.deleted_after_busy.contains(instance_id) {
            return Ok(None);
        } else {
            "succeeded"
        };
        Ok(Some(InstanceRecord {
            plan_id: "small".to_string(),
            last_operation: Some(RegistryLastOperation {
                operation_type: "update".to_string(),
                state: state.to_string(),
            }),
        }))
    }

    async fn count_instances_of_plan(
        &self,
        _offering_id: &str,
        _plan_id: &str,
    ) -> Result<usize, ClientError> {
        Ok(0)
    }

    async fn count_instances_of_offering(&self, _offering_id: &str) -> Result<usize, ClientError> {
        Ok(self.listed.len())
    }
}

/// Broker replaying scripted answers per instance.
///
/// The last scripted answer repeats once the script runs out. An instance
/// without a script answers with a connection error.
#[derive(Default)]
pub struct FakeBroker {
    triggers: Mutex<HashMap<InstanceId, VecDeque<TriggerResponse>>>,
    polls: Mutex<HashMap<InstanceId, VecDeque<LastOperation>>>,
    trigger_counts: Mutex<HashMap<InstanceId, usize>>,
}

impl FakeBroker {
    pub fn with_trigger(self, guid: &str, responses: Vec<TriggerResponse>) -> Self {
        self.triggers
            .lock()
            .unwrap()
            .insert(InstanceId::new(guid), responses.into());
        self
    }

    pub fn with_polls(self, guid: &str, results: Vec<LastOperation>) -> Self {
        self.polls
            .lock()
            .unwrap()
            .insert(InstanceId::new(guid), results.into());
        self
    }

    pub fn trigger_count(&self, guid: &str) -> usize {
        self.trigger_counts
            .lock()
            .unwrap()
            .get(&InstanceId::new(guid))
            .copied()
            .unwrap_or(0)
    }
}

fn next<T: Clone>(script: &mut VecDeque<T>) -> Option<T> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

#[async_trait]
impl BrokerApi for FakeBroker {
    async fn upgrade_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<TriggerResponse, ClientError> {
        *self
            .trigger_counts
            .lock()
            .unwrap()
            .entry(instance_id.clone())
            .or_default() += 1;

        self.triggers
            .lock()
            .unwrap()
            .get_mut(instance_id)
            .and_then(next)
            .ok_or_else(|| connection_error("broker"))
    }

    async fn last_operation(
        &self,
        instance_id: &InstanceId,
        _operation_data: &str,
    ) -> Result<LastOperation, ClientError> {
        self.polls
            .lock()
            .unwrap()
            .get_mut(instance_id)
            .and_then(next)
            .ok_or_else(|| connection_error("broker"))
    }
}
