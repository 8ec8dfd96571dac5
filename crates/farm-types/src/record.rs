//! Desired-state records served by the control plane
//!
//! A record declares one logical terminal and the status it should be in.
//! Records are ephemeral: they are fetched fresh on every poll and only
//! describe the current reconciliation cycle.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Environment variables handed to a terminal instance
pub type Environment = BTreeMap<String, String>;

/// One terminal as declared by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredRecord {
    /// Stable terminal identifier, unique within a payload
    pub id: String,

    /// Target status (defaults to running when the control plane omits it)
    #[serde(default)]
    pub status: DesiredStatus,

    /// Caller-supplied environment for the instance
    #[serde(default, deserialize_with = "null_as_empty")]
    pub environment: Environment,
}

impl DesiredRecord {
    /// Create a running record with an empty environment
    pub fn running(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: DesiredStatus::Running,
            environment: Environment::new(),
        }
    }

    /// Create a stopped record with an empty environment
    pub fn stopped(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: DesiredStatus::Stopped,
            environment: Environment::new(),
        }
    }

    /// Attach an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Check that the id can be turned into a container name.
    ///
    /// Container runtimes accept `[a-zA-Z0-9_.-]` after the first character,
    /// and the prefix already supplies a valid first character.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.id.is_empty() {
            return Err(RecordError::EmptyId);
        }

        if let Some(c) = self
            .id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
        {
            return Err(RecordError::InvalidId {
                id: self.id.clone(),
                character: c,
            });
        }

        Ok(())
    }

    /// Parse a control-plane payload (a JSON array of records)
    pub fn parse_list(payload: &[u8]) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// `(id, status)` pairs whose status is neither `RUNNING` nor `STOPPED`.
    ///
    /// Such records still parse (as running); this lets callers report them.
    /// Returns nothing for a payload [`DesiredRecord::parse_list`] rejects.
    pub fn nonstandard_statuses(payload: &[u8]) -> Vec<(String, String)> {
        #[derive(Deserialize)]
        struct StatusOnly {
            id: String,
            #[serde(default)]
            status: Option<String>,
        }

        serde_json::from_slice::<Vec<StatusOnly>>(payload)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| match r.status {
                Some(status) if !DesiredStatus::is_known(&status) => Some((r.id, status)),
                _ => None,
            })
            .collect()
    }
}

/// Status a terminal should converge to
///
/// Only `STOPPED` tears a terminal down. Any other value the control plane
/// sends (`RUNNING`, `PENDING`, `ERROR`, `null`, ...) means it should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DesiredStatus {
    #[default]
    Running,
    Stopped,
}

impl DesiredStatus {
    /// Interpret a status string from the control plane
    pub fn from_wire(raw: &str) -> Self {
        if raw == "STOPPED" {
            Self::Stopped
        } else {
            Self::Running
        }
    }

    /// Whether `raw` is one of the two statuses the reconciler acts on directly
    pub fn is_known(raw: &str) -> bool {
        matches!(raw, "RUNNING" | "STOPPED")
    }
}

impl<'de> Deserialize<'de> for DesiredStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::from_wire).unwrap_or_default())
    }
}

impl std::fmt::Display for DesiredStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Reasons a record cannot be reconciled
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record has an empty id")]
    EmptyId,

    #[error("record id {id:?} contains unsupported character {character:?}")]
    InvalidId { id: String, character: char },
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Environment, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Environment>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_defaults_to_running() {
        let records = DesiredRecord::parse_list(br#"[{"id": "a"}]"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, DesiredStatus::Running);
        assert!(records[0].environment.is_empty());
    }

    #[test]
    fn test_full_record() {
        let payload = br#"[
            {"id": "a", "status": "STOPPED", "environment": {"LOGIN": "42"}, "extra": true},
            {"id": "b", "environment": null}
        ]"#;
        let records = DesiredRecord::parse_list(payload).unwrap();

        assert_eq!(records[0], DesiredRecord::stopped("a").with_env("LOGIN", "42"));
        assert_eq!(records[1], DesiredRecord::running("b"));
    }

    #[test]
    fn test_other_statuses_mean_running() {
        let payload = br#"[
            {"id": "a", "status": "PENDING"},
            {"id": "b", "status": "ERROR"},
            {"id": "c", "status": null},
            {"id": "d", "status": "stopped"},
            {"id": "e", "status": "STOPPED"}
        ]"#;
        let records = DesiredRecord::parse_list(payload).unwrap();

        let statuses: Vec<_> = records.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                DesiredStatus::Running,
                DesiredStatus::Running,
                DesiredStatus::Running,
                DesiredStatus::Running,
                DesiredStatus::Stopped,
            ]
        );
    }

    #[test]
    fn test_nonstandard_statuses() {
        let payload = br#"[
            {"id": "a", "status": "RUNNING"},
            {"id": "b", "status": "PENDING"},
            {"id": "c"},
            {"id": "d", "status": null}
        ]"#;
        assert_eq!(
            DesiredRecord::nonstandard_statuses(payload),
            vec![("b".to_string(), "PENDING".to_string())]
        );
        assert!(DesiredRecord::nonstandard_statuses(b"not json").is_empty());
    }

    #[test]
    fn test_known_statuses() {
        assert!(DesiredStatus::is_known("RUNNING"));
        assert!(DesiredStatus::is_known("STOPPED"));
        assert!(!DesiredStatus::is_known("STARTING"));
    }

    #[test]
    fn test_non_array_rejected() {
        assert!(DesiredRecord::parse_list(br#"{"id": "a"}"#).is_err());
        assert!(DesiredRecord::parse_list(b"not json").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(DesiredRecord::running("acct_01.live-2").validate().is_ok());
        assert_eq!(DesiredRecord::running("").validate(), Err(RecordError::EmptyId));
        assert!(matches!(
            DesiredRecord::running("a/b").validate(),
            Err(RecordError::InvalidId { character: '/', .. })
        ));
    }
}
