//! In-memory admin fake for tests.
//!
//! Keeps instances and databases in maps, records every call in order and
//! can be told to fail specific operations.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::admin::SpannerAdmin;
use crate::error::{AdminError, Result};
use crate::model::{Database, DatabaseState, Instance, InstanceState};
use crate::naming;

/// Operation kinds, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateInstance,
    GetInstance,
    Scale,
    UpdateLabels,
    DeleteInstance,
    CreateDatabase,
    GetDatabase,
    DropDatabase,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateInstance {
        display_name: String,
        instance_id: String,
        config: String,
        node_count: i32,
    },
    GetInstance(String),
    Scale {
        instance_id: String,
        node_count: i32,
    },
    UpdateLabels {
        instance_id: String,
        labels: BTreeMap<String, String>,
    },
    DeleteInstance(String),
    CreateDatabase {
        instance_id: String,
        name: String,
    },
    GetDatabase {
        instance_id: String,
        name: String,
    },
    DropDatabase {
        instance_id: String,
        name: String,
    },
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::CreateInstance { .. } => Op::CreateInstance,
            Call::GetInstance(_) => Op::GetInstance,
            Call::Scale { .. } => Op::Scale,
            Call::UpdateLabels { .. } => Op::UpdateLabels,
            Call::DeleteInstance(_) => Op::DeleteInstance,
            Call::CreateDatabase { .. } => Op::CreateDatabase,
            Call::GetDatabase { .. } => Op::GetDatabase,
            Call::DropDatabase { .. } => Op::DropDatabase,
        }
    }

    /// True for calls that change cloud-side state.
    pub fn is_mutation(&self) -> bool {
        !matches!(self.op(), Op::GetInstance | Op::GetDatabase)
    }
}

#[derive(Default)]
struct State {
    instances: BTreeMap<String, Instance>,
    databases: BTreeMap<(String, String), Database>,
    calls: Vec<Call>,
    /// Remaining injected failures per operation (`None` = until cleared).
    failures: HashMap<Op, (Option<u32>, String)>,
}

impl State {
    fn take_failure(&mut self, op: Op) -> Option<AdminError> {
        let (remaining, message) = self.failures.get_mut(&op)?;
        let err = AdminError::Api {
            status: 503,
            message: message.clone(),
        };
        if let Some(n) = remaining {
            *n = n.saturating_sub(1);
            if *n == 0 {
                self.failures.remove(&op);
            }
        }
        Some(err)
    }
}

/// Spanner admin fake holding all state in memory.
pub struct MemoryAdmin {
    project_id: String,
    state: Mutex<State>,
}

impl MemoryAdmin {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `call` and return an injected failure for it, if any.
    fn enter(&self, call: Call) -> Result<MutexGuard<'_, State>> {
        let mut state = self.state();
        let op = call.op();
        state.calls.push(call);
        match state.take_failure(op) {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }

    /// Seed an instance directly, without recording a call.
    pub fn insert_instance(&self, instance_id: &str, node_count: i32, labels: &[(&str, &str)]) {
        let instance = Instance {
            name: naming::instance_name(&self.project_id, instance_id),
            config: naming::instance_config_name(&self.project_id, "regional-us-central1"),
            display_name: instance_id.to_string(),
            node_count,
            state: InstanceState::Ready,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.state()
            .instances
            .insert(instance_id.to_string(), instance);
    }

    /// Seed a database directly, without recording a call.
    pub fn insert_database(&self, instance_id: &str, name: &str) {
        let database = Database {
            name: naming::database_name(&self.project_id, instance_id, name),
            state: DatabaseState::Ready,
        };
        self.state()
            .databases
            .insert((instance_id.to_string(), name.to_string()), database);
    }

    /// Change cloud-side state behind the reconciler's back.
    pub fn set_node_count(&self, instance_id: &str, node_count: i32) {
        if let Some(i) = self.state().instances.get_mut(instance_id) {
            i.node_count = node_count;
        }
    }

    pub fn set_labels(&self, instance_id: &str, labels: &[(&str, &str)]) {
        if let Some(i) = self.state().instances.get_mut(instance_id) {
            i.labels = labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }
    }

    pub fn instance(&self, instance_id: &str) -> Option<Instance> {
        self.state().instances.get(instance_id).cloned()
    }

    pub fn database(&self, instance_id: &str, name: &str) -> Option<Database> {
        self.state()
            .databases
            .get(&(instance_id.to_string(), name.to_string()))
            .cloned()
    }

    /// Fail every call of `op` until [`MemoryAdmin::clear_failures`].
    pub fn fail(&self, op: Op, message: &str) {
        self.state()
            .failures
            .insert(op, (None, message.to_string()));
    }

    /// Fail the next `times` calls of `op`.
    pub fn fail_times(&self, op: Op, times: u32, message: &str) {
        if times > 0 {
            self.state()
                .failures
                .insert(op, (Some(times), message.to_string()));
        }
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Mutating calls so far, in order.
    pub fn mutations(&self) -> Vec<Call> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Number of recorded calls of `op`.
    pub fn count(&self, op: Op) -> usize {
        self.state().calls.iter().filter(|c| c.op() == op).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn not_found_instance(&self, instance_id: &str) -> AdminError {
        AdminError::NotFound(naming::instance_name(&self.project_id, instance_id))
    }
}

#[async_trait]
impl SpannerAdmin for MemoryAdmin {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn create_instance(
        &self,
        display_name: &str,
        instance_id: &str,
        config: &str,
        node_count: i32,
    ) -> Result<()> {
        let mut state = self.enter(Call::CreateInstance {
            display_name: display_name.to_string(),
            instance_id: instance_id.to_string(),
            config: config.to_string(),
            node_count,
        })?;
        if state.instances.contains_key(instance_id) {
            return Err(AdminError::Api {
                status: 409,
                message: format!("instance {} already exists", instance_id),
            });
        }
        let instance = Instance {
            name: naming::instance_name(&self.project_id, instance_id),
            config: naming::instance_config_name(&self.project_id, config),
            display_name: display_name.to_string(),
            node_count,
            state: InstanceState::Ready,
            labels: BTreeMap::new(),
        };
        state.instances.insert(instance_id.to_string(), instance);
        Ok(())
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        let state = self.enter(Call::GetInstance(instance_id.to_string()))?;
        state
            .instances
            .get(instance_id)
            .cloned()
            .ok_or_else(|| self.not_found_instance(instance_id))
    }

    async fn scale(&self, instance_id: &str, node_count: i32) -> Result<()> {
        let mut state = self.enter(Call::Scale {
            instance_id: instance_id.to_string(),
            node_count,
        })?;
        match state.instances.get_mut(instance_id) {
            Some(i) => {
                i.node_count = node_count;
                Ok(())
            }
            None => Err(self.not_found_instance(instance_id)),
        }
    }

    async fn update_labels(
        &self,
        instance_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut state = self.enter(Call::UpdateLabels {
            instance_id: instance_id.to_string(),
            labels: labels.clone(),
        })?;
        match state.instances.get_mut(instance_id) {
            Some(i) => {
                i.labels = labels.clone();
                Ok(())
            }
            None => Err(self.not_found_instance(instance_id)),
        }
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        let mut state = self.enter(Call::DeleteInstance(instance_id.to_string()))?;
        match state.instances.remove(instance_id) {
            Some(_) => Ok(()),
            None => Err(self.not_found_instance(instance_id)),
        }
    }

    async fn create_database(&self, instance_id: &str, name: &str) -> Result<()> {
        let mut state = self.enter(Call::CreateDatabase {
            instance_id: instance_id.to_string(),
            name: name.to_string(),
        })?;
        if !state.instances.contains_key(instance_id) {
            return Err(self.not_found_instance(instance_id));
        }
        let database = Database {
            name: naming::database_name(&self.project_id, instance_id, name),
            state: DatabaseState::Ready,
        };
        state
            .databases
            .insert((instance_id.to_string(), name.to_string()), database);
        Ok(())
    }

    async fn get_database(&self, instance_id: &str, name: &str) -> Result<Database> {
        let state = self.enter(Call::GetDatabase {
            instance_id: instance_id.to_string(),
            name: name.to_string(),
        })?;
        state
            .databases
            .get(&(instance_id.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                AdminError::NotFound(naming::database_name(&self.project_id, instance_id, name))
            })
    }

    async fn drop_database(&self, instance_id: &str, name: &str) -> Result<()> {
        let mut state = self.enter(Call::DropDatabase {
            instance_id: instance_id.to_string(),
            name: name.to_string(),
        })?;
        match state
            .databases
            .remove(&(instance_id.to_string(), name.to_string()))
        {
            Some(_) => Ok(()),
            None => Err(AdminError::NotFound(naming::database_name(
                &self.project_id,
                instance_id,
                name,
            ))),
        }
    }
}
