//! Docker-backed runtime

use super::ContainerRuntime;
use crate::error::{RuntimeError, RuntimeResult};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerSummary, HostConfig, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use farm_types::{InstanceName, LaunchSpec, ObservedInstance, OwnershipLabel, RuntimeState};
use futures_util::TryStreamExt;
use std::collections::HashMap;

/// Runtime talking to the local Docker engine
pub struct DockerRuntime {
    docker: Docker,
    stop_timeout_secs: i64,
    auto_pull_image: bool,
}

impl DockerRuntime {
    /// Connect with the local defaults (`DOCKER_HOST` or the unix socket) and
    /// make sure the engine answers.
    pub async fn connect(stop_timeout_secs: u64) -> RuntimeResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        docker.ping().await?;

        Ok(Self::with_client(docker, stop_timeout_secs))
    }

    pub fn with_client(docker: Docker, stop_timeout_secs: u64) -> Self {
        Self {
            docker,
            stop_timeout_secs: stop_timeout_secs as i64,
            auto_pull_image: true,
        }
    }

    /// Whether a missing image is pulled before creating an instance
    pub fn with_auto_pull(mut self, enabled: bool) -> Self {
        self.auto_pull_image = enabled;
        self
    }

    async fn create_container(&self, spec: &LaunchSpec) -> Result<(), DockerError> {
        let options = CreateContainerOptions {
            name: spec.name.to_string(),
            ..Default::default()
        };

        self.docker
            .create_container(Some(options), container_config(spec))
            .await
            .map(|_| ())
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let (from_image, tag) = split_image_ref(image);
        tracing::info!(image = %image, "Pulling image");

        self.docker
            .create_image(
                Some(CreateImageOptions {
                    from_image: from_image.to_string(),
                    tag: tag.to_string(),
                    ..Default::default()
                }),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list(&self, label: &OwnershipLabel) -> RuntimeResult<Vec<ObservedInstance>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label.selector()]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        Ok(containers.into_iter().filter_map(observe).collect())
    }

    async fn create(&self, spec: &LaunchSpec) -> RuntimeResult<()> {
        match self.create_container(spec).await {
            Ok(()) => {}
            Err(e) if self.auto_pull_image && is_missing(&e) => {
                self.pull_image(&spec.image).await?;
                self.create_container(spec).await?;
            }
            Err(e) => return Err(e.into()),
        }

        self.docker
            .start_container::<String>(spec.name.as_str(), None)
            .await?;

        Ok(())
    }

    async fn start(&self, name: &InstanceName) -> RuntimeResult<()> {
        self.docker
            .start_container::<String>(name.as_str(), None)
            .await
            .map_err(RuntimeError::from)
    }

    async fn stop(&self, name: &InstanceName) -> RuntimeResult<()> {
        let result = self
            .docker
            .stop_container(
                name.as_str(),
                Some(StopContainerOptions {
                    t: self.stop_timeout_secs,
                }),
            )
            .await;

        match result {
            Err(e) if is_not_running(&e) || is_missing(&e) => {
                tracing::debug!(instance = %name, "Instance already stopped");
                Ok(())
            }
            other => other.map_err(RuntimeError::from),
        }
    }

    async fn remove(&self, name: &InstanceName) -> RuntimeResult<()> {
        let result = self
            .docker
            .remove_container(
                name.as_str(),
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;

        match result {
            Err(e) if is_missing(&e) => {
                tracing::debug!(instance = %name, "Instance already removed");
                Ok(())
            }
            other => other.map_err(RuntimeError::from),
        }
    }
}

fn container_config(spec: &LaunchSpec) -> Config<String> {
    let host_config = HostConfig {
        restart_policy: Some(RestartPolicy {
            name: Some(restart_policy_name(spec.restart_policy)),
            maximum_retry_count: None,
        }),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        env: Some(spec.env_pairs()),
        labels: Some(spec.labels.clone().into_iter().collect()),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// 404: no such container, or no such image on create
fn is_missing(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// 304: the container was not running
fn is_not_running(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}

/// Split `repo[:tag]` for the pull API. An untagged reference means `latest`;
/// a digest reference is passed through whole.
fn split_image_ref(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }

    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => (&image[..name_start + i], &image[name_start + i + 1..]),
        None => (image, "latest"),
    }
}

/// Convert a Docker listing entry. Entries without a name are skipped.
fn observe(summary: ContainerSummary) -> Option<ObservedInstance> {
    // Docker reports names with a leading slash
    let name = summary
        .names?
        .into_iter()
        .next()?
        .trim_start_matches('/')
        .to_string();

    Some(ObservedInstance {
        name: InstanceName::new(name),
        state: RuntimeState::parse(summary.state.as_deref().unwrap_or("unknown")),
        labels: summary.labels.unwrap_or_default().into_iter().collect(),
    })
}

fn restart_policy_name(policy: farm_types::RestartPolicy) -> RestartPolicyNameEnum {
    match policy {
        farm_types::RestartPolicy::No => RestartPolicyNameEnum::NO,
        farm_types::RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        farm_types::RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
        farm_types::RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
    }
}
