//! Recurring escalation of stalled adoptions.

use std::sync::Arc;
use std::time::Duration;

use adopet_storage::AdoptionStorage;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

use crate::service::{AdoptionService, ReconcileReport};

/// Default period between reconciliation runs.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Periodically calls [`AdoptionService::reconcile`].
///
/// Ticks never overlap: a tick that starts while another is still running is
/// skipped. Missed ticks are not caught up.
pub struct EscalationScheduler<S: AdoptionStorage> {
    service: Arc<AdoptionService<S>>,
    interval: Duration,
    run_on_start: bool,
    tick_lock: Mutex<()>,
}

impl<S: AdoptionStorage> EscalationScheduler<S> {
    pub fn new(service: Arc<AdoptionService<S>>) -> Self {
        Self {
            service,
            interval: DEFAULT_INTERVAL,
            run_on_start: true,
            tick_lock: Mutex::new(()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    pub fn service(&self) -> &Arc<AdoptionService<S>> {
        &self.service
    }

    /// Run one reconciliation, unless one is already in progress.
    ///
    /// Returns `None` when the tick was skipped.
    pub async fn run_tick(&self) -> Option<ReconcileReport> {
        let Ok(_guard) = self.tick_lock.try_lock() else {
            tracing::warn!("previous escalation tick still running; skipping");
            return None;
        };
        let report = self.service.reconcile().await;
        self.service.flush().await;
        Some(report)
    }

    /// Tick until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// `on_tick` sees every completed report, e.g. to persist state.
    pub async fn run<F>(&self, mut shutdown: watch::Receiver<bool>, mut on_tick: F)
    where
        F: FnMut(&ReconcileReport) + Send,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The first tick completes immediately.
        ticker.tick().await;
        tracing::info!(interval_secs = self.interval.as_secs(), "escalation scheduler started");
        if self.run_on_start {
            if let Some(report) = self.run_tick().await {
                on_tick(&report);
            }
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(report) = self.run_tick().await {
                        on_tick(&report);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("escalation scheduler stopped");
    }
}
