//! In-memory runtime implementation

use super::ContainerRuntime;
use crate::error::{RuntimeError, RuntimeResult};
use async_trait::async_trait;
use farm_types::{
    ActionKind, InstanceName, LaunchSpec, ObservedInstance, OwnershipLabel, RuntimeState,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory runtime for development and testing.
///
/// Behaves like a single-host container engine: names are unique, `stop`
/// leaves an exited instance behind, `remove` deletes it. Calls can be made
/// to fail or to take a fixed time.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRuntime {
    instances: Arc<RwLock<BTreeMap<InstanceName, ObservedInstance>>>,
    calls: Arc<RwLock<Vec<(ActionKind, InstanceName)>>>,
    failures: Arc<RwLock<HashSet<(ActionKind, InstanceName)>>>,
    latency: Option<Duration>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed an instance, labeled or not
    pub async fn insert(&self, instance: ObservedInstance) {
        self.instances
            .write()
            .await
            .insert(instance.name.clone(), instance);
    }

    /// Make every `kind` call on `name` fail until cleared
    pub async fn fail_on(&self, kind: ActionKind, name: &InstanceName) {
        self.failures.write().await.insert((kind, name.clone()));
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Force an instance into `state`, as a crash would
    pub async fn set_state(&self, name: &InstanceName, state: RuntimeState) {
        if let Some(instance) = self.instances.write().await.get_mut(name) {
            instance.state = state;
        }
    }

    pub async fn get(&self, name: &InstanceName) -> Option<ObservedInstance> {
        self.instances.read().await.get(name).cloned()
    }

    /// Every instance, labeled or not
    pub async fn snapshot(&self) -> Vec<ObservedInstance> {
        self.instances.read().await.values().cloned().collect()
    }

    /// Mutating calls received so far, in order
    pub async fn calls(&self) -> Vec<(ActionKind, InstanceName)> {
        self.calls.read().await.clone()
    }

    async fn enter(&self, kind: ActionKind, name: &InstanceName) -> RuntimeResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.calls.write().await.push((kind, name.clone()));

        if self.failures.read().await.contains(&(kind, name.clone())) {
            return Err(RuntimeError::Api(format!("injected {} failure", kind)));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn list(&self, label: &OwnershipLabel) -> RuntimeResult<Vec<ObservedInstance>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let instances = self.instances.read().await;
        Ok(instances
            .values()
            .filter(|i| label.matches(&i.labels))
            .cloned()
            .collect())
    }

    async fn create(&self, spec: &LaunchSpec) -> RuntimeResult<()> {
        self.enter(ActionKind::Create, &spec.name).await?;

        let mut instances = self.instances.write().await;
        if instances.contains_key(&spec.name) {
            return Err(RuntimeError::Conflict(spec.name.to_string()));
        }

        instances.insert(
            spec.name.clone(),
            ObservedInstance {
                name: spec.name.clone(),
                state: RuntimeState::Running,
                labels: spec.labels.clone(),
            },
        );
        Ok(())
    }

    async fn start(&self, name: &InstanceName) -> RuntimeResult<()> {
        self.enter(ActionKind::Start, name).await?;

        let mut instances = self.instances.write().await;
        let instance = instances
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        instance.state = RuntimeState::Running;
        Ok(())
    }

    async fn stop(&self, name: &InstanceName) -> RuntimeResult<()> {
        self.enter(ActionKind::Stop, name).await?;

        if let Some(instance) = self.instances.write().await.get_mut(name) {
            instance.state = RuntimeState::Exited;
        }
        Ok(())
    }

    async fn remove(&self, name: &InstanceName) -> RuntimeResult<()> {
        self.enter(ActionKind::Remove, name).await?;

        self.instances.write().await.remove(name);
        Ok(())
    }
}
