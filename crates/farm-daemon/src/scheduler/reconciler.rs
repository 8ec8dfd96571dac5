//! Reconciliation of desired records against the managed set

use crate::config::FarmConfig;
use crate::launcher::Launcher;
use crate::runtime::ContainerRuntime;
use farm_types::{
    Action, ActionOutcome, ActionResult, CycleReport, DesiredRecord, DesiredStatus,
    InstanceName, ManagedSet, NamingScheme,
};
use std::collections::{HashMap, HashSet};

/// Diffs desired state against observed state and applies the difference
#[derive(Debug, Clone)]
pub struct Reconciler {
    naming: NamingScheme,
    launcher: Launcher,
    orphan_cleanup: bool,
    dry_run: bool,
}

impl Reconciler {
    /// Create a reconciler that leaves orphans alone
    pub fn new(naming: NamingScheme, launcher: Launcher) -> Self {
        Self {
            naming,
            launcher,
            orphan_cleanup: false,
            dry_run: false,
        }
    }

    pub fn from_config(config: &FarmConfig) -> Self {
        Self::new(config.runtime.naming(), Launcher::from_config(config))
            .with_orphan_cleanup(config.scheduler.orphan_cleanup)
            .with_dry_run(config.scheduler.dry_run)
    }

    /// Also stop and remove managed instances no record refers to
    pub fn with_orphan_cleanup(mut self, enabled: bool) -> Self {
        self.orphan_cleanup = enabled;
        self
    }

    /// Plan actions but never execute them
    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Compute the actions that move `observed` towards `desired`.
    ///
    /// Records are handled in order against a projection of the managed set,
    /// so a repeated id sees the effect of its earlier occurrence. Orphans are
    /// only considered when cleanup is enabled and `desired` is non-empty.
    pub fn plan(&self, desired: &[DesiredRecord], observed: &ManagedSet) -> Vec<Action> {
        let mut projection = Projection::new(observed);
        let mut actions = Vec::new();
        let mut declared = HashSet::new();

        for record in desired {
            let name = self.naming.name_for(&record.id);
            declared.insert(name.clone());

            if let Err(e) = record.validate() {
                tracing::warn!(id = %record.id, error = %e, "Skipping invalid record");
                continue;
            }

            match (record.status, projection.presence(&name)) {
                (DesiredStatus::Stopped, Presence::Absent) => {}
                (DesiredStatus::Stopped, _) => {
                    actions.push(Action::Stop { name: name.clone() });
                    actions.push(Action::Remove { name: name.clone() });
                    projection.set(name, Presence::Absent);
                }
                (DesiredStatus::Running, Presence::Absent) => {
                    let spec = self.launcher.launch(&name, record);
                    actions.push(Action::Create { spec });
                    projection.set(name, Presence::Running);
                }
                (DesiredStatus::Running, Presence::NotRunning) => {
                    actions.push(Action::Start { name: name.clone() });
                    projection.set(name, Presence::Running);
                }
                (DesiredStatus::Running, Presence::Running) => {
                    tracing::trace!(name = %name, "Already converged");
                }
            }
        }

        if self.orphan_cleanup && !desired.is_empty() {
            for name in observed.names() {
                if declared.contains(name) {
                    continue;
                }
                tracing::warn!(name = %name, "Found orphan instance");
                actions.push(Action::Stop { name: name.clone() });
                actions.push(Action::Remove { name: name.clone() });
            }
        }

        actions
    }

    /// Execute `actions` in order.
    ///
    /// A failed action is logged and recorded; it never prevents the actions
    /// after it from running. The next cycle retries whatever did not converge.
    pub async fn apply<R>(&self, runtime: &R, actions: &[Action]) -> Vec<ActionResult>
    where
        R: ContainerRuntime + ?Sized,
    {
        let mut results = Vec::with_capacity(actions.len());

        for action in actions {
            if self.dry_run {
                tracing::info!(action = %action, "Dry run, not executing");
                results.push(ActionResult::new(action, ActionOutcome::Skipped));
                continue;
            }

            tracing::info!(action = %action, "Applying");

            let result = match action {
                Action::Create { spec } => runtime.create(spec).await,
                Action::Start { name } => runtime.start(name).await,
                Action::Stop { name } => runtime.stop(name).await,
                Action::Remove { name } => runtime.remove(name).await,
            };

            let outcome = match result {
                Ok(()) => {
                    tracing::info!(action = %action, "Applied");
                    ActionOutcome::Succeeded
                }
                Err(e) => {
                    tracing::error!(action = %action, error = %e, "Action failed, will retry next cycle");
                    ActionOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };

            results.push(ActionResult::new(action, outcome));
        }

        results
    }

    /// Plan and apply one cycle
    pub async fn reconcile<R>(
        &self,
        runtime: &R,
        desired: &[DesiredRecord],
        observed: &ManagedSet,
    ) -> CycleReport
    where
        R: ContainerRuntime + ?Sized,
    {
        let started_at = chrono::Utc::now();

        let actions = self.plan(desired, observed);
        tracing::debug!(
            desired = desired.len(),
            observed = observed.len(),
            planned = actions.len(),
            "Planned reconciliation"
        );

        let results = self.apply(runtime, &actions).await;

        CycleReport {
            desired: desired.len(),
            observed: observed.len(),
            results,
            started_at,
            finished_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Absent,
    NotRunning,
    Running,
}

/// Managed set as it will look once the actions planned so far have run
struct Projection<'a> {
    observed: &'a ManagedSet,
    overrides: HashMap<InstanceName, Presence>,
}

impl<'a> Projection<'a> {
    fn new(observed: &'a ManagedSet) -> Self {
        Self {
            observed,
            overrides: HashMap::new(),
        }
    }

    fn presence(&self, name: &InstanceName) -> Presence {
        if let Some(presence) = self.overrides.get(name) {
            return *presence;
        }
        match self.observed.get(name) {
            None => Presence::Absent,
            Some(instance) if instance.state.is_running() => Presence::Running,
            Some(_) => Presence::NotRunning,
        }
    }

    fn set(&mut self, name: InstanceName, presence: Presence) {
        self.overrides.insert(name, presence);
    }
}
