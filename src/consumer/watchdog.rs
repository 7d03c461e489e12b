//! Liveness watchdog for consumer-side subscriptions.
//!
//! A source that stops notifying without ever failing a send is invisible to
//! the reconciler. The watchdog sweeps all mirrors on a fixed global period;
//! any mirror not updated for `heartbeat period × multiplier` is resynced from
//! the source's status, which closes any pending gap.
//!
//! The watchdog never removes a subscription. A failed resync is logged and
//! retried on the next sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::reconciler::{NotificationReconciler, ReconcileOutcome};
use crate::scheduler::PeriodicTaskScheduler;
use crate::types::{SubscriptionData, SubscriptionId, TaskKey};

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Mirrors flagged for liveness checking.
    pub checked: usize,
    pub resynced: Vec<(SubscriptionId, ReconcileOutcome)>,
    pub failed: Vec<SubscriptionId>,
}

impl SweepReport {
    pub fn stale(&self) -> usize {
        self.resynced.len() + self.failed.len()
    }
}

pub struct LivenessWatchdog {
    reconciler: Arc<NotificationReconciler>,
    error_threshold_multiplier: u32,
}

impl LivenessWatchdog {
    pub fn new(reconciler: Arc<NotificationReconciler>, error_threshold_multiplier: u32) -> Self {
        LivenessWatchdog {
            reconciler,
            error_threshold_multiplier,
        }
    }

    /// Whether `data` has been quiet for longer than its threshold at `now`.
    pub fn is_stale(&self, data: &SubscriptionData, now: DateTime<Utc>) -> bool {
        if !data.liveness_check {
            return false;
        }
        let threshold_secs = data
            .heartbeat_period_secs
            .saturating_mul(u64::from(self.error_threshold_multiplier));
        let threshold = i64::try_from(threshold_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);
        now - data.last_update > threshold
    }

    /// Sweeps as of `now`, resyncing stale mirrors in parallel.
    #[instrument(skip(self))]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let candidates: Vec<SubscriptionData> = self
            .reconciler
            .mirrors()
            .into_iter()
            .filter(|m| m.liveness_check)
            .collect();

        let mut report = SweepReport {
            checked: candidates.len(),
            ..SweepReport::default()
        };

        let mut resyncs = JoinSet::new();
        for data in candidates.iter().filter(|m| self.is_stale(m, now)) {
            info!(
                subscription_id = %data.id,
                last_update = %data.last_update,
                heartbeat_secs = data.heartbeat_period_secs,
                "subscription quiet too long, forcing resync"
            );
            let reconciler = Arc::clone(&self.reconciler);
            let id = data.id;
            resyncs.spawn(async move { (id, reconciler.resync(id).await) });
        }

        while let Some(joined) = resyncs.join_next().await {
            match joined {
                Ok((id, Ok(outcome))) => report.resynced.push((id, outcome)),
                Ok((id, Err(e))) => {
                    warn!(subscription_id = %id, error = %e, "resync failed, retrying next sweep");
                    report.failed.push(id);
                }
                Err(e) => warn!(error = %e, "resync task panicked"),
            }
        }

        report.resynced.sort_by_key(|(id, _)| *id);
        report.failed.sort();
        debug!(checked = report.checked, stale = report.stale(), "sweep finished");
        report
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Registers the periodic sweep with `scheduler`.
    pub fn start(self: &Arc<Self>, scheduler: &PeriodicTaskScheduler<TaskKey>, interval: Duration) {
        let watchdog = Arc::clone(self);
        scheduler.schedule(TaskKey::Watchdog, interval, interval, move || {
            let watchdog = Arc::clone(&watchdog);
            async move {
                watchdog.sweep().await;
            }
        });
        info!(?interval, multiplier = self.error_threshold_multiplier, "liveness watchdog started");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::store::{InMemoryDataStore, SubscriptionDataStore};
    use crate::consumer::source::SourceError;
    use crate::signal::{DestinationRegistry, SignalDispatcher};
    use crate::test_utils::{MockSourceClient, RecordingDestination};
    use crate::types::{EventNumber, TopicDescriptor, TriggerOperation};

    const PERIOD: u64 = 60;
    const MULTIPLIER: u32 = 3;

    struct Fixture {
        watchdog: Arc<LivenessWatchdog>,
        store: Arc<InMemoryDataStore>,
        source: Arc<MockSourceClient>,
        destination: Arc<RecordingDestination>,
    }

    fn topic() -> TopicDescriptor {
        TopicDescriptor::new("Patient", TriggerOperation::Create)
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryDataStore::new());
        let source = Arc::new(MockSourceClient::new());
        let destination = Arc::new(RecordingDestination::new("engine"));
        let mut registry = DestinationRegistry::new();
        registry.bind(topic(), destination.clone(), None);
        let reconciler = Arc::new(NotificationReconciler::new(
            store.clone(),
            source.clone(),
            Arc::new(SignalDispatcher::new(registry)),
        ));
        Fixture {
            watchdog: Arc::new(LivenessWatchdog::new(reconciler, MULTIPLIER)),
            store,
            source,
            destination,
        }
    }

    fn mirror(id: u64, received: u64, quiet_secs: i64, now: DateTime<Utc>) -> SubscriptionData {
        let mut data = SubscriptionData::new(SubscriptionId(id), format!("r{}", id), "http://source", topic(), PERIOD);
        data.events_received = EventNumber(received);
        data.last_update = now - chrono::Duration::seconds(quiet_secs);
        data
    }

    #[test]
    fn threshold_is_period_times_multiplier() {
        let f = fixture();
        let now = Utc::now();
        let limit = (PERIOD * MULTIPLIER as u64) as i64;

        assert!(!f.watchdog.is_stale(&mirror(1, 0, limit, now), now));
        assert!(f.watchdog.is_stale(&mirror(1, 0, limit + 1, now), now));
    }

    #[test]
    fn unflagged_mirror_is_never_stale() {
        let f = fixture();
        let now = Utc::now();
        let mut data = mirror(1, 0, 10_000, now);
        data.liveness_check = false;
        assert!(!f.watchdog.is_stale(&data, now));
    }

    #[tokio::test]
    async fn quiet_subscription_is_resynced() {
        let f = fixture();
        let now = Utc::now();
        let quiet = (PERIOD * MULTIPLIER as u64) as i64 + 1;
        f.store.insert(mirror(1, 4, quiet, now)).unwrap();
        f.source.set_position(6);
        f.source.add_event(5, "Patient/5");
        f.source.add_event(6, "Patient/6");

        let report = f.watchdog.sweep_at(now).await;

        assert_eq!(report.checked, 1);
        assert_eq!(report.resynced.len(), 1);
        assert_eq!(report.resynced[0].1.dispatched(), 2);
        assert_eq!(f.source.status_queries(), 1);
        assert_eq!(f.destination.payloads(), vec!["Patient/5", "Patient/6"]);
        assert_eq!(f.store.get(SubscriptionId(1)).unwrap().events_received, EventNumber(6));
    }

    #[tokio::test]
    async fn quiet_but_caught_up_only_refreshes() {
        let f = fixture();
        let now = Utc::now();
        f.store.insert(mirror(1, 4, 1_000, now)).unwrap();
        f.source.set_position(4);

        let report = f.watchdog.sweep_at(now).await;

        assert_eq!(report.resynced, vec![(SubscriptionId(1), ReconcileOutcome::Refreshed)]);
        assert!(f.source.event_queries().is_empty());
        // Refreshed, so the next sweep leaves it alone.
        let again = f.watchdog.sweep_at(Utc::now()).await;
        assert_eq!(again.stale(), 0);
    }

    #[tokio::test]
    async fn fresh_subscription_is_left_alone() {
        let f = fixture();
        let now = Utc::now();
        f.store.insert(mirror(1, 4, 10, now)).unwrap();

        let report = f.watchdog.sweep_at(now).await;

        assert_eq!(report.checked, 1);
        assert_eq!(report.stale(), 0);
        assert_eq!(f.source.status_queries(), 0);
    }

    #[tokio::test]
    async fn failed_status_query_is_retried_next_sweep() {
        let f = fixture();
        let now = Utc::now();
        f.store.insert(mirror(1, 4, 1_000, now)).unwrap();
        f.source.fail_next_status_query(SourceError::Network("refused".into()));

        let first = f.watchdog.sweep_at(now).await;
        assert_eq!(first.failed, vec![SubscriptionId(1)]);
        assert!(f.store.get(SubscriptionId(1)).is_some());

        f.source.set_position(4);
        let second = f.watchdog.sweep_at(now).await;
        assert_eq!(second.resynced.len(), 1);
        assert_eq!(f.source.status_queries(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn start_registers_periodic_sweep() {
        let f = fixture();
        // Last update far in the past relative to wall clock.
        let now = Utc::now();
        f.store.insert(mirror(1, 0, 10_000, now)).unwrap();
        let scheduler = PeriodicTaskScheduler::new();

        f.watchdog.start(&scheduler, Duration::from_secs(30));
        assert!(scheduler.is_scheduled(&TaskKey::Watchdog));

        tokio::time::sleep(Duration::from_secs(61)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // First sweep resyncs (Refreshed), second finds it fresh.
        assert_eq!(f.source.status_queries(), 1);
        scheduler.cancel_all();
    }
}
