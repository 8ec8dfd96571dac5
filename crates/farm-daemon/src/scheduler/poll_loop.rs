//! Poll loop driving fetch and reconciliation
//!
//! One cycle at a time: fetch desired state, list the managed set, reconcile,
//! then sleep for the poll interval. Nothing that goes wrong inside a cycle
//! ends the loop; only the shutdown signal does, and it never interrupts a
//! cycle that has already started.

use super::clock::Clock;
use super::reconciler::Reconciler;
use crate::fetcher::ConfigFetcher;
use crate::runtime::{inspect_managed, ContainerRuntime};
use farm_types::{CycleReport, OwnershipLabel};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

/// How a single cycle ended
#[derive(Debug)]
pub enum CycleOutcome {
    /// Actions were planned and applied (possibly none)
    Reconciled(CycleReport),

    /// The control plane declared no terminals
    NothingDesired,

    /// Desired state could not be fetched; nothing was touched
    FetchFailed(String),

    /// The managed set could not be listed; nothing was touched
    InspectFailed(String),
}

/// The reconciliation driver
pub struct PollLoop {
    fetcher: Arc<dyn ConfigFetcher>,
    runtime: Arc<dyn ContainerRuntime>,
    clock: Arc<dyn Clock>,
    reconciler: Reconciler,
    label: OwnershipLabel,
    interval: Duration,
}

impl PollLoop {
    pub fn new(
        fetcher: Arc<dyn ConfigFetcher>,
        runtime: Arc<dyn ContainerRuntime>,
        clock: Arc<dyn Clock>,
        reconciler: Reconciler,
        label: OwnershipLabel,
        interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            runtime,
            clock,
            reconciler,
            label,
            interval,
        }
    }

    /// Run cycles until `shutdown` turns true. Returns the number of cycles run.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        tracing::info!(interval_secs = self.interval.as_secs(), "Poll loop started");

        let mut cycles = 0u64;
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            cycles += 1;
            self.run_once()
                .instrument(tracing::info_span!("cycle", n = cycles))
                .await;

            tokio::select! {
                _ = self.clock.sleep(self.interval) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        tracing::info!(cycles, "Poll loop stopped");
        cycles
    }

    /// Run a single fetch and reconcile cycle
    pub async fn run_once(&self) -> CycleOutcome {
        tracing::info!("Checking configuration");

        let desired = match self.fetcher.fetch().await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch desired state, skipping cycle");
                return CycleOutcome::FetchFailed(e.to_string());
            }
        };

        // An empty list never triggers teardown, whatever produced it
        if desired.is_empty() {
            tracing::info!("No terminals desired, skipping cycle");
            return CycleOutcome::NothingDesired;
        }

        let observed = match inspect_managed(self.runtime.as_ref(), &self.label).await {
            Ok(set) => set,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list managed instances, skipping cycle");
                return CycleOutcome::InspectFailed(e.to_string());
            }
        };

        let report = self
            .reconciler
            .reconcile(self.runtime.as_ref(), &desired, &observed)
            .await;

        tracing::info!(
            desired = report.desired,
            observed = report.observed,
            succeeded = report.succeeded(),
            failed = report.failed(),
            duration_ms = report.duration_ms(),
            "Cycle complete"
        );

        CycleOutcome::Reconciled(report)
    }
}

/// Resolves once shutdown is requested. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FarmConfig;
    use crate::error::{FetchError, FetchResult};
    use crate::runtime::InMemoryRuntime;
    use async_trait::async_trait;
    use farm_types::{ActionKind, DesiredRecord, InstanceName, ObservedInstance, RuntimeState};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued fetch results, then reports an empty list
    struct ScriptedFetcher {
        script: Mutex<VecDeque<FetchResult<Vec<DesiredRecord>>>>,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<FetchResult<Vec<DesiredRecord>>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl ConfigFetcher for ScriptedFetcher {
        async fn fetch(&self) -> FetchResult<Vec<DesiredRecord>> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Returns immediately and requests shutdown after a number of sleeps
    struct StepClock {
        sleeps: Mutex<Vec<Duration>>,
        stop_after: usize,
        shutdown: watch::Sender<bool>,
    }

    #[async_trait]
    impl Clock for StepClock {
        async fn sleep(&self, duration: Duration) {
            let count = {
                let mut sleeps = self.sleeps.lock().unwrap();
                sleeps.push(duration);
                sleeps.len()
            };
            if count >= self.stop_after {
                let _ = self.shutdown.send(true);
            }
        }
    }

    fn poll_loop(
        fetcher: Arc<dyn ConfigFetcher>,
        runtime: &InMemoryRuntime,
        clock: Arc<dyn Clock>,
    ) -> PollLoop {
        let config = FarmConfig::default();
        PollLoop::new(
            fetcher,
            Arc::new(runtime.clone()),
            clock,
            Reconciler::from_config(&config),
            config.runtime.ownership_label(),
            config.scheduler.poll_interval(),
        )
    }

    async fn seeded_runtime() -> InMemoryRuntime {
        let runtime = InMemoryRuntime::new();
        runtime
            .insert(
                ObservedInstance::new("tt-mt5-a", RuntimeState::Running)
                    .owned_by(&OwnershipLabel::default()),
            )
            .await;
        runtime
    }

    #[tokio::test]
    async fn test_fetch_failure_touches_nothing() {
        let runtime = seeded_runtime().await;
        let fetcher = ScriptedFetcher::new(vec![Err(FetchError::Status { status: 503 })]);
        let (tx, _rx) = watch::channel(false);
        let clock = Arc::new(StepClock {
            sleeps: Mutex::new(Vec::new()),
            stop_after: 1,
            shutdown: tx,
        });

        let outcome = poll_loop(fetcher, &runtime, clock).run_once().await;

        assert!(matches!(outcome, CycleOutcome::FetchFailed(_)));
        assert!(runtime.calls().await.is_empty());
        assert!(runtime.get(&InstanceName::new("tt-mt5-a")).await.is_some());
    }

    #[tokio::test]
    async fn test_empty_desired_skips_even_with_cleanup() {
        let runtime = seeded_runtime().await;
        let fetcher = ScriptedFetcher::new(vec![Ok(Vec::new())]);
        let (tx, _rx) = watch::channel(false);
        let clock = Arc::new(StepClock {
            sleeps: Mutex::new(Vec::new()),
            stop_after: 1,
            shutdown: tx,
        });

        let config = FarmConfig::default();
        let poll = PollLoop::new(
            fetcher,
            Arc::new(runtime.clone()),
            clock,
            Reconciler::from_config(&config).with_orphan_cleanup(true),
            config.runtime.ownership_label(),
            config.scheduler.poll_interval(),
        );

        assert!(matches!(poll.run_once().await, CycleOutcome::NothingDesired));
        assert!(runtime.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_runs_cycles_until_shutdown() {
        let runtime = InMemoryRuntime::new();
        let fetcher = ScriptedFetcher::new(vec![
            Err(FetchError::Transport("connection refused".to_string())),
            Ok(vec![DesiredRecord::running("a")]),
            Ok(vec![DesiredRecord::running("a")]),
        ]);
        let (tx, rx) = watch::channel(false);
        let clock = Arc::new(StepClock {
            sleeps: Mutex::new(Vec::new()),
            stop_after: 3,
            shutdown: tx,
        });

        let cycles = poll_loop(fetcher, &runtime, clock.clone()).run(rx).await;

        assert_eq!(cycles, 3);
        assert_eq!(
            *clock.sleeps.lock().unwrap(),
            vec![Duration::from_secs(60); 3]
        );
        // Created on the second cycle, left alone on the third
        assert_eq!(
            runtime.calls().await,
            vec![(ActionKind::Create, InstanceName::new("tt-mt5-a"))]
        );
    }

    #[tokio::test]
    async fn test_shutdown_before_first_cycle() {
        let runtime = InMemoryRuntime::new();
        let fetcher = ScriptedFetcher::new(vec![Ok(vec![DesiredRecord::running("a")])]);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let clock = Arc::new(StepClock {
            sleeps: Mutex::new(Vec::new()),
            stop_after: usize::MAX,
            shutdown: tx,
        });

        let cycles = poll_loop(fetcher, &runtime, clock).run(rx).await;

        assert_eq!(cycles, 0);
        assert!(runtime.calls().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_sleep() {
        let runtime = InMemoryRuntime::new();
        let fetcher = ScriptedFetcher::new(Vec::new());
        let (tx, rx) = watch::channel(false);

        let config = FarmConfig::default();
        let poll = PollLoop::new(
            fetcher,
            Arc::new(runtime),
            Arc::new(crate::scheduler::TokioClock),
            Reconciler::from_config(&config),
            config.runtime.ownership_label(),
            Duration::from_secs(3600),
        );

        let handle = tokio::spawn(async move { poll.run(rx).await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), 1);
    }
}
