//! Time-bounded runtime wrapper

use super::ContainerRuntime;
use crate::error::{RuntimeError, RuntimeResult};
use async_trait::async_trait;
use farm_types::{InstanceName, LaunchSpec, ObservedInstance, OwnershipLabel};
use std::future::Future;
use std::time::Duration;

/// Wraps a runtime so that no single call can block a cycle for longer than
/// `limit`. A call that runs out of time reports [`RuntimeError::Timeout`];
/// whatever it was doing on the runtime side is not rolled back.
pub struct TimedRuntime<R> {
    inner: R,
    limit: Duration,
}

impl<R> TimedRuntime<R> {
    pub fn new(inner: R, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn bound<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = RuntimeResult<T>>,
    ) -> RuntimeResult<T> {
        tokio::time::timeout(self.limit, call)
            .await
            .map_err(|_| RuntimeError::Timeout {
                operation,
                secs: self.limit.as_secs(),
            })?
    }
}

#[async_trait]
impl<R: ContainerRuntime> ContainerRuntime for TimedRuntime<R> {
    async fn list(&self, label: &OwnershipLabel) -> RuntimeResult<Vec<ObservedInstance>> {
        self.bound("list", self.inner.list(label)).await
    }

    async fn create(&self, spec: &LaunchSpec) -> RuntimeResult<()> {
        self.bound("create", self.inner.create(spec)).await
    }

    async fn start(&self, name: &InstanceName) -> RuntimeResult<()> {
        self.bound("start", self.inner.start(name)).await
    }

    async fn stop(&self, name: &InstanceName) -> RuntimeResult<()> {
        self.bound("stop", self.inner.stop(name)).await
    }

    async fn remove(&self, name: &InstanceName) -> RuntimeResult<()> {
        self.bound("remove", self.inner.remove(name)).await
    }
}
