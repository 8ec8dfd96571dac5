//! Launch parameters for a new terminal instance

use crate::instance::InstanceName;
use crate::record::Environment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the runtime needs to create and start one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Instance name
    pub name: InstanceName,

    /// Image reference
    pub image: String,

    /// Final environment, platform variables already applied
    pub environment: Environment,

    /// Labels, always including the ownership label
    pub labels: BTreeMap<String, String>,

    /// Restart policy applied by the runtime
    pub restart_policy: RestartPolicy,
}

impl LaunchSpec {
    /// Environment as `KEY=value` strings, the form container APIs take
    pub fn env_pairs(&self) -> Vec<String> {
        self.environment
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

/// Runtime restart policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    Always,
    OnFailure,
    /// Restart after crashes until explicitly stopped
    #[default]
    UnlessStopped,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Always => "always",
            Self::OnFailure => "on-failure",
            Self::UnlessStopped => "unless-stopped",
        }
    }
}

impl std::fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_pairs_sorted() {
        let spec = LaunchSpec {
            name: InstanceName::new("tt-mt5-a"),
            image: "img".to_string(),
            environment: [("B", "2"), ("A", "1")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            labels: BTreeMap::new(),
            restart_policy: RestartPolicy::default(),
        };

        assert_eq!(spec.env_pairs(), vec!["A=1".to_string(), "B=2".to_string()]);
        assert_eq!(spec.restart_policy.as_str(), "unless-stopped");
    }
}
