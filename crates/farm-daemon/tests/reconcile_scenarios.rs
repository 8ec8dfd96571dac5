//! End-to-end reconciliation scenarios against the in-memory runtime

use farm_daemon::config::FarmConfig;
use farm_daemon::runtime::{inspect_managed, ContainerRuntime, InMemoryRuntime};
use farm_daemon::scheduler::Reconciler;
use farm_types::{
    Action, ActionKind, DesiredRecord, InstanceName, ManagedSet, ObservedInstance,
    OwnershipLabel, RuntimeState,
};

fn reconciler() -> Reconciler {
    Reconciler::from_config(&FarmConfig::default())
}

async fn runtime_with(instances: &[(&str, RuntimeState)]) -> InMemoryRuntime {
    let label = OwnershipLabel::default();
    let runtime = InMemoryRuntime::new();
    for (name, state) in instances {
        runtime
            .insert(ObservedInstance::new(*name, state.clone()).owned_by(&label))
            .await;
    }
    runtime
}

async fn observe(runtime: &InMemoryRuntime) -> ManagedSet {
    inspect_managed(runtime, &OwnershipLabel::default())
        .await
        .expect("in-memory listing never fails")
}

fn kinds(actions: &[Action]) -> Vec<(ActionKind, String)> {
    actions
        .iter()
        .map(|a| (a.kind(), a.name().to_string()))
        .collect()
}

#[tokio::test]
async fn scenario_create_missing_terminal() {
    let runtime = runtime_with(&[]).await;
    let desired = vec![DesiredRecord::running("a").with_env("MT5_SERVER", "Demo")];

    let actions = reconciler().plan(&desired, &observe(&runtime).await);
    assert_eq!(kinds(&actions), vec![(ActionKind::Create, "tt-mt5-a".to_string())]);

    let report = reconciler()
        .reconcile(&runtime, &desired, &observe(&runtime).await)
        .await;
    assert_eq!(report.succeeded(), 1);

    let instance = runtime.get(&InstanceName::new("tt-mt5-a")).await.unwrap();
    assert_eq!(instance.state, RuntimeState::Running);
    assert!(OwnershipLabel::default().matches(&instance.labels));
}

#[tokio::test]
async fn scenario_stop_and_remove() {
    let runtime = runtime_with(&[("tt-mt5-a", RuntimeState::Running)]).await;
    let desired = vec![DesiredRecord::stopped("a")];

    let actions = reconciler().plan(&desired, &observe(&runtime).await);
    assert_eq!(
        kinds(&actions),
        vec![
            (ActionKind::Stop, "tt-mt5-a".to_string()),
            (ActionKind::Remove, "tt-mt5-a".to_string()),
        ]
    );

    reconciler()
        .reconcile(&runtime, &desired, &observe(&runtime).await)
        .await;
    assert!(runtime.get(&InstanceName::new("tt-mt5-a")).await.is_none());
}

#[tokio::test]
async fn scenario_already_running() {
    let runtime = runtime_with(&[("tt-mt5-a", RuntimeState::Running)]).await;

    let actions = reconciler().plan(&[DesiredRecord::running("a")], &observe(&runtime).await);
    assert!(actions.is_empty());
}

#[tokio::test]
async fn scenario_restart_exited() {
    let runtime = runtime_with(&[("tt-mt5-a", RuntimeState::Exited)]).await;
    let desired = vec![DesiredRecord::running("a")];

    let actions = reconciler().plan(&desired, &observe(&runtime).await);
    assert_eq!(kinds(&actions), vec![(ActionKind::Start, "tt-mt5-a".to_string())]);

    reconciler()
        .reconcile(&runtime, &desired, &observe(&runtime).await)
        .await;
    assert_eq!(
        runtime.get(&InstanceName::new("tt-mt5-a")).await.unwrap().state,
        RuntimeState::Running
    );
}

#[tokio::test]
async fn scenario_empty_desired_leaves_orphan() {
    let runtime = runtime_with(&[("tt-mt5-a", RuntimeState::Running)]).await;

    let actions = reconciler().plan(&[], &observe(&runtime).await);
    assert!(actions.is_empty());
}

#[tokio::test]
async fn crashed_terminal_is_started_next_cycle() {
    let runtime = runtime_with(&[]).await;
    let desired = vec![DesiredRecord::running("a")];
    let name = InstanceName::new("tt-mt5-a");

    reconciler()
        .reconcile(&runtime, &desired, &observe(&runtime).await)
        .await;
    runtime.set_state(&name, RuntimeState::Exited).await;

    let report = reconciler()
        .reconcile(&runtime, &desired, &observe(&runtime).await)
        .await;
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].kind, ActionKind::Start);
    assert_eq!(runtime.get(&name).await.unwrap().state, RuntimeState::Running);
}

#[tokio::test]
async fn foreign_container_with_colliding_name_is_not_listed() {
    // Someone else's container that happens to use our naming scheme
    let runtime = InMemoryRuntime::new();
    runtime
        .insert(ObservedInstance::new("tt-mt5-a", RuntimeState::Exited))
        .await;

    let listed = runtime.list(&OwnershipLabel::default()).await.unwrap();
    assert!(listed.is_empty());

    let actions = reconciler()
        .with_orphan_cleanup(true)
        .plan(&[DesiredRecord::stopped("a")], &observe(&runtime).await);
    assert!(actions.is_empty());
}
