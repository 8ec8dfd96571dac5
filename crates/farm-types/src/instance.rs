//! Observed runtime instances and the managed set
//!
//! An [`ObservedInstance`] is the container runtime's view of one terminal.
//! The [`ManagedSet`] is the subset of those instances this system owns,
//! indexed by [`InstanceName`] for constant-time lookup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Default prefix for terminal instance names
pub const DEFAULT_NAME_PREFIX: &str = "tt-mt5-";

/// Runtime name of a terminal instance
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceName(String);

impl InstanceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for InstanceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives instance names from record ids.
///
/// The mapping is a fixed prefix followed by the id, so it is injective and
/// stable across polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingScheme {
    prefix: String,
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self::new(DEFAULT_NAME_PREFIX)
    }
}

impl NamingScheme {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Name of the instance backing the terminal `id`
    pub fn name_for(&self, id: &str) -> InstanceName {
        InstanceName(format!("{}{}", self.prefix, id))
    }
}

/// Label marking an instance as owned by this system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipLabel {
    pub key: String,
    pub value: String,
}

impl Default for OwnershipLabel {
    fn default() -> Self {
        Self::new("managed_by", "tradetaper")
    }
}

impl OwnershipLabel {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// True when `labels` carries this key with exactly this value
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        labels.get(&self.key).is_some_and(|v| *v == self.value)
    }

    /// `key=value`, the form runtime label filters expect
    pub fn selector(&self) -> String {
        format!("{}={}", self.key, self.value)
    }
}

impl std::fmt::Display for OwnershipLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Runtime state of an instance as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeState {
    Running,
    Exited,
    /// Any other state (created, paused, restarting, dead, ...)
    Other(String),
}

impl RuntimeState {
    /// Parse the runtime's state string
    pub fn parse(raw: &str) -> Self {
        match raw {
            "running" => Self::Running,
            "exited" => Self::Exited,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// One instance as reported by the container runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedInstance {
    pub name: InstanceName,
    pub state: RuntimeState,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ObservedInstance {
    pub fn new(name: impl Into<String>, state: RuntimeState) -> Self {
        Self {
            name: InstanceName::new(name),
            state,
            labels: BTreeMap::new(),
        }
    }

    /// Attach the ownership label
    pub fn owned_by(mut self, label: &OwnershipLabel) -> Self {
        self.labels.insert(label.key.clone(), label.value.clone());
        self
    }
}

/// Instances this system is allowed to act on, indexed by name
#[derive(Debug, Clone, Default)]
pub struct ManagedSet {
    instances: HashMap<InstanceName, ObservedInstance>,
}

impl ManagedSet {
    /// Build the set from a runtime listing.
    ///
    /// Instances without `label` are dropped, even if the runtime's own
    /// filter let them through.
    pub fn from_listing(
        listing: impl IntoIterator<Item = ObservedInstance>,
        label: &OwnershipLabel,
    ) -> Self {
        let instances = listing
            .into_iter()
            .filter(|i| label.matches(&i.labels))
            .map(|i| (i.name.clone(), i))
            .collect();

        Self { instances }
    }

    pub fn get(&self, name: &InstanceName) -> Option<&ObservedInstance> {
        self.instances.get(name)
    }

    pub fn contains(&self, name: &InstanceName) -> bool {
        self.instances.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Instance names in sorted order
    pub fn names(&self) -> Vec<&InstanceName> {
        let mut names: Vec<_> = self.instances.keys().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObservedInstance> {
        self.instances.values()
    }
}
