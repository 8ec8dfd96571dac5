//! Configuration for farm-daemon
//!
//! Built once at startup and handed to each component. Nothing below `main`
//! reads the process environment.

use farm_types::{NamingScheme, OwnershipLabel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FarmConfig {
    /// Control plane connection
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,

    /// Container runtime and launch settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Poll loop and reconciliation policy
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Control plane configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    /// Base URL of the control plane
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Shared secret sent as `x-orchestrator-secret`
    #[serde(default = "default_secret")]
    pub secret: String,

    /// Fetch timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            secret: default_secret(),
            timeout_secs: default_fetch_timeout(),
        }
    }
}

impl std::fmt::Debug for ControlPlaneConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlaneConfig")
            .field("endpoint", &self.endpoint)
            .field("secret", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ControlPlaneConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Image every terminal is launched from
    #[serde(default = "default_image")]
    pub image: String,

    /// Prefix prepended to record ids to form instance names
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Ownership label key
    #[serde(default = "default_label_key")]
    pub label_key: String,

    /// Ownership label value
    #[serde(default = "default_label_value")]
    pub label_value: String,

    /// Upper bound on any single runtime call, in seconds
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Grace period given to a stopping instance, in seconds
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Pull the image when the host does not have it yet
    #[serde(default = "default_auto_pull")]
    pub auto_pull_image: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            name_prefix: default_name_prefix(),
            label_key: default_label_key(),
            label_value: default_label_value(),
            operation_timeout_secs: default_operation_timeout(),
            stop_timeout_secs: default_stop_timeout(),
            auto_pull_image: default_auto_pull(),
        }
    }
}

impl RuntimeConfig {
    pub fn naming(&self) -> NamingScheme {
        NamingScheme::new(self.name_prefix.clone())
    }

    pub fn ownership_label(&self) -> OwnershipLabel {
        OwnershipLabel::new(self.label_key.clone(), self.label_value.clone())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Stop and remove managed instances with no desired record
    #[serde(default)]
    pub orphan_cleanup: bool,

    /// Plan and log actions without executing them
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            orphan_cleanup: false,
            dry_run: false,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_endpoint() -> String {
    "https://api.tradetaper.io".to_string()
}

fn default_secret() -> String {
    "your-orchestrator-secret".to_string()
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_image() -> String {
    "tradetaper/mt5-terminal:latest".to_string()
}

fn default_name_prefix() -> String {
    farm_types::DEFAULT_NAME_PREFIX.to_string()
}

fn default_label_key() -> String {
    "managed_by".to_string()
}

fn default_label_value() -> String {
    "tradetaper".to_string()
}

fn default_operation_timeout() -> u64 {
    60
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_auto_pull() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl FarmConfig {
    /// Load configuration from defaults, an optional file and `FARM_*` variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`FarmConfig::load`], reading `FARM_*` variables from `env`
    /// instead of the process environment when given.
    pub fn load_with_env(
        path: Option<&str>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&FarmConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // FARM_SCHEDULER__POLL_INTERVAL_SECS=30 -> scheduler.poll_interval_secs
        builder = builder.add_source(
            config::Environment::with_prefix("FARM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<(), String> {
        let endpoint = &self.control_plane.endpoint;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(format!("control plane endpoint must be an http(s) URL: {}", endpoint));
        }
        if self.runtime.image.trim().is_empty() {
            return Err("image must not be empty".to_string());
        }
        if self.runtime.name_prefix.is_empty() {
            return Err("instance name prefix must not be empty".to_string());
        }
        if self.runtime.label_key.is_empty() {
            return Err("ownership label key must not be empty".to_string());
        }
        if self.scheduler.poll_interval_secs == 0 {
            return Err("poll interval must be at least one second".to_string());
        }
        if self.control_plane.timeout_secs == 0 {
            return Err("control plane timeout must be at least one second".to_string());
        }
        if self.runtime.operation_timeout_secs == 0 {
            return Err("runtime operation timeout must be at least one second".to_string());
        }
        Ok(())
    }
}
