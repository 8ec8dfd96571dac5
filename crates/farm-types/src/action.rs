//! Corrective actions and per-cycle results
//!
//! The reconciler plans a list of [`Action`]s and records what happened to
//! each one in a [`CycleReport`].

use crate::instance::InstanceName;
use crate::launch::LaunchSpec;
use serde::{Deserialize, Serialize};

/// One corrective runtime operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Create and start a new instance
    Create { spec: LaunchSpec },

    /// Start an existing, stopped instance
    Start { name: InstanceName },

    /// Stop a running instance
    Stop { name: InstanceName },

    /// Remove a (stopped) instance
    Remove { name: InstanceName },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Create { .. } => ActionKind::Create,
            Self::Start { .. } => ActionKind::Start,
            Self::Stop { .. } => ActionKind::Stop,
            Self::Remove { .. } => ActionKind::Remove,
        }
    }

    /// Instance the action targets
    pub fn name(&self) -> &InstanceName {
        match self {
            Self::Create { spec } => &spec.name,
            Self::Start { name } | Self::Stop { name } | Self::Remove { name } => name,
        }
    }

    /// True for actions that take an instance down
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::Stop { .. } | Self::Remove { .. })
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind(), self.name())
    }
}

/// Discriminant of [`Action`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Start,
    Stop,
    Remove,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "Create"),
            Self::Start => write!(f, "Start"),
            Self::Stop => write!(f, "Stop"),
            Self::Remove => write!(f, "Remove"),
        }
    }
}

/// What happened when an action was applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Succeeded,
    Failed { reason: String },
    /// Planned but not executed (dry run)
    Skipped,
}

/// Result log entry for one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub kind: ActionKind,
    pub name: InstanceName,
    pub outcome: ActionOutcome,
}

impl ActionResult {
    pub fn new(action: &Action, outcome: ActionOutcome) -> Self {
        Self {
            kind: action.kind(),
            name: action.name().clone(),
            outcome,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Failed { .. })
    }
}

/// Summary of one reconciliation cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    /// Number of desired records considered
    pub desired: usize,

    /// Number of managed instances observed
    pub observed: usize,

    /// Per-action results, in execution order
    pub results: Vec<ActionResult>,

    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl CycleReport {
    /// True when the cycle had nothing to correct
    pub fn is_converged(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == ActionOutcome::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
