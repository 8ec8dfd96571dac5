//! Container runtime layer for farm-daemon
//!
//! The reconciler only talks to the runtime through [`ContainerRuntime`].
//! [`DockerRuntime`] drives a local Docker engine, [`InMemoryRuntime`] backs
//! tests, and [`TimedRuntime`] bounds every call of another runtime.

mod docker;
mod memory;
mod timed;

pub use docker::DockerRuntime;
pub use memory::InMemoryRuntime;
pub use timed::TimedRuntime;

use crate::error::RuntimeResult;
use async_trait::async_trait;
use farm_types::{InstanceName, LaunchSpec, ManagedSet, ObservedInstance, OwnershipLabel};

/// Management operations on the container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List instances carrying `label`, in any state
    async fn list(&self, label: &OwnershipLabel) -> RuntimeResult<Vec<ObservedInstance>>;

    /// Create an instance from `spec` and start it
    async fn create(&self, spec: &LaunchSpec) -> RuntimeResult<()>;

    /// Start an existing instance
    async fn start(&self, name: &InstanceName) -> RuntimeResult<()>;

    /// Stop a running instance. Succeeds if it is already stopped or gone.
    async fn stop(&self, name: &InstanceName) -> RuntimeResult<()>;

    /// Remove an instance. Succeeds if it is already gone.
    async fn remove(&self, name: &InstanceName) -> RuntimeResult<()>;
}

/// List the instances this system manages, indexed by name
pub async fn inspect_managed<R>(runtime: &R, label: &OwnershipLabel) -> RuntimeResult<ManagedSet>
where
    R: ContainerRuntime + ?Sized,
{
    let listing = runtime.list(label).await?;
    Ok(ManagedSet::from_listing(listing, label))
}
