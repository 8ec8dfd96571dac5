//! Instance launcher
//!
//! Turns a desired record into the launch parameters for a new instance.

use crate::config::FarmConfig;
use farm_types::{DesiredRecord, InstanceName, LaunchSpec, OwnershipLabel, RestartPolicy};
use std::collections::BTreeMap;

/// Variable carrying the control plane URL into the terminal
pub const ENV_API_ENDPOINT: &str = "API_ENDPOINT";

/// Variable toggling the terminal's VNC server
pub const ENV_ENABLE_VNC: &str = "ENABLE_VNC";

/// Builds [`LaunchSpec`]s for one platform
#[derive(Debug, Clone)]
pub struct Launcher {
    image: String,
    api_endpoint: String,
    label: OwnershipLabel,
}

impl Launcher {
    pub fn new(
        image: impl Into<String>,
        api_endpoint: impl Into<String>,
        label: OwnershipLabel,
    ) -> Self {
        Self {
            image: image.into(),
            api_endpoint: api_endpoint.into(),
            label,
        }
    }

    pub fn from_config(config: &FarmConfig) -> Self {
        Self::new(
            config.runtime.image.clone(),
            config.control_plane.endpoint.clone(),
            config.runtime.ownership_label(),
        )
    }

    /// Launch parameters for `record`, to be run under `name`.
    ///
    /// Platform variables are applied last and replace any caller value of
    /// the same key.
    pub fn launch(&self, name: &InstanceName, record: &DesiredRecord) -> LaunchSpec {
        let mut environment = record.environment.clone();
        for (key, value) in self.platform_env() {
            if environment.insert(key.to_string(), value).is_some() {
                tracing::debug!(name = %name, key, "Platform variable overrides record value");
            }
        }

        LaunchSpec {
            name: name.clone(),
            image: self.image.clone(),
            environment,
            labels: BTreeMap::from([(self.label.key.clone(), self.label.value.clone())]),
            restart_policy: RestartPolicy::UnlessStopped,
        }
    }

    fn platform_env(&self) -> [(&'static str, String); 2] {
        [
            (ENV_API_ENDPOINT, self.api_endpoint.clone()),
            // Terminals run headless
            (ENV_ENABLE_VNC, "false".to_string()),
        ]
    }
}
