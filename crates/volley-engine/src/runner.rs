//! Control loop: find the next batch inside the horizon, run it, persist.

use crate::clock::Clock;
use crate::coordinator::DispatchCoordinator;
use crate::gateway::ActionGateway;
use crate::shutdown::Shutdown;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use volley_core::persistence::SchedulePersistence;
use volley_core::report::DispatchReport;
use volley_core::schedule::ScheduleStore;

pub struct Runner<G> {
    coordinator: DispatchCoordinator<G>,
    persistence: SchedulePersistence,
    clock: Arc<dyn Clock>,
    shutdown: Shutdown,
    horizon: Duration,
    tick: Duration,
    /// Ids already handed to the coordinator; never merged back in.
    taken: HashSet<String>,
}

impl<G: ActionGateway> Runner<G> {
    pub fn new(
        coordinator: DispatchCoordinator<G>,
        persistence: SchedulePersistence,
        clock: Arc<dyn Clock>,
        shutdown: Shutdown,
        horizon: Duration,
        tick: Duration,
    ) -> Self {
        Self {
            coordinator,
            persistence,
            clock,
            shutdown,
            horizon,
            tick,
            taken: HashSet::new(),
        }
    }

    pub fn coordinator(&self) -> &DispatchCoordinator<G> {
        &self.coordinator
    }

    /// Run at most one batch.
    ///
    /// Requests written to the snapshot by another process since the last
    /// tick are merged in first, so the writes below never drop them.
    /// Batches whose completion instant already passed are drained before
    /// the horizon is consulted. Persistence failures are logged and never
    /// undo a dispatch.
    pub async fn run_once(&mut self, store: &mut ScheduleStore) -> Option<DispatchReport> {
        self.absorb_snapshot(store);
        let now = self.clock.now_secs();
        let completion = store
            .first_expired(now)
            .or_else(|| store.next_activation(now, self.horizon))?;

        let batch = store.take(completion);
        self.taken.extend(batch.iter().map(|r| r.id.clone()));
        if let Err(e) = self.persistence.save(store) {
            tracing::warn!(error = %e, "snapshot write failed after taking batch");
        }
        tracing::info!(completion, requests = batch.len(), "batch activated");

        let report = self.coordinator.run(completion, batch).await;
        if let Err(e) = self.persistence.record(store, &report) {
            tracing::warn!(error = %e, "snapshot write failed after dispatch");
        }
        Some(report)
    }

    fn absorb_snapshot(&self, store: &mut ScheduleStore) {
        match self.persistence.load() {
            Ok(on_disk) => {
                let mut fresh = ScheduleStore::new();
                for (completion, batch) in on_disk.batches() {
                    for req in batch.iter().filter(|r| !self.taken.contains(&r.id)) {
                        fresh.insert(completion, req.clone());
                    }
                }
                let added = store.merge(&fresh);
                if added > 0 {
                    tracing::info!(added, "picked up requests added to the snapshot");
                }
            }
            Err(e) => tracing::warn!(error = %e, "snapshot unreadable, keeping in-memory schedule"),
        }
    }

    /// Tick until shutdown. Returns the reports of every batch that ran.
    pub async fn run_loop(&mut self, store: &mut ScheduleStore) -> Vec<DispatchReport> {
        let mut reports = Vec::new();
        tracing::info!(
            batches = store.batch_count(),
            tick_secs = self.tick.as_secs(),
            horizon_secs = self.horizon.as_secs(),
            "control loop started"
        );
        while !self.shutdown.is_triggered() {
            if let Some(report) = self.run_once(store).await {
                reports.push(report);
                // Another batch may already be due.
                continue;
            }
            if self.shutdown.sleep(&*self.clock, self.tick).await.is_err() {
                break;
            }
        }
        tracing::info!(runs = reports.len(), "control loop stopped");
        reports
    }
}
