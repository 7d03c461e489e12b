//! Inbound reconciliation: turn envelopes into in-order, de-duplicated
//! resource references.
//!
//! # Algorithm
//!
//! With `received` the last processed event number and `position` the
//! envelope's `eventsSinceSubscriptionStart`:
//!
//! | position | envelope carries event `received + 1`? | outcome |
//! |---|---|---|
//! | `< received` | - | [`Stale`]: nothing changes |
//! | `== received` | - | [`Refreshed`]: timestamp and status only |
//! | `== received + 1` | yes | [`Delivered`]: dispatch that one reference |
//! | otherwise | - | [`Recovered`]: query `[received + 1, position]`, dispatch all |
//!
//! A recovery query supersedes the envelope's own event list, so events
//! carried on the envelope are never dispatched twice.
//!
//! If the source's reply has a hole, the position only advances through the
//! unbroken run before it and the pass fails with
//! [`SourceError::IncompleteRange`]. The rest of the gap is asked for again on
//! the next envelope or watchdog sweep.
//!
//! # Ordering
//!
//! All work on one subscription runs under its lock, so concurrent envelopes
//! (organic or watchdog-forced) never interleave their read-modify-write.
//!
//! The new position is persisted before anything is dispatched. A crash
//! between the two loses those dispatches rather than repeating them, which
//! keeps dispatch at-most-once per `(subscription, event number)`.
//!
//! [`Stale`]: ReconcileOutcome::Stale
//! [`Refreshed`]: ReconcileOutcome::Refreshed
//! [`Delivered`]: ReconcileOutcome::Delivered
//! [`Recovered`]: ReconcileOutcome::Recovered

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::source::{SourceClient, SourceError};
use super::store::{DataStoreError, SubscriptionDataStore};
use crate::locks::KeyedLocks;
use crate::notification::{EventRange, NotificationEnvelope, NotificationType};
use crate::signal::SignalDispatcher;
use crate::types::{EventNumber, SubscriptionData, SubscriptionId};

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Behind the recorded position. Nothing changed.
    Stale,
    /// At the recorded position. Only the timestamp and status were refreshed.
    Refreshed,
    /// The next in-order event arrived on the envelope and was dispatched.
    Delivered { number: EventNumber },
    /// A gap was closed by a range query.
    Recovered { range: EventRange, dispatched: usize },
}

impl ReconcileOutcome {
    /// Number of references handed to the dispatcher.
    pub fn dispatched(&self) -> usize {
        match self {
            ReconcileOutcome::Stale | ReconcileOutcome::Refreshed => 0,
            ReconcileOutcome::Delivered { .. } => 1,
            ReconcileOutcome::Recovered { dispatched, .. } => *dispatched,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("subscription not tracked: {0}")]
    Unknown(SubscriptionId),

    /// The range query failed, leaving the subscription untouched, or came
    /// back with a hole, leaving it at the end of the contiguous run.
    #[error("recovery of {range} failed: {source}")]
    Recovery {
        range: EventRange,
        #[source]
        source: SourceError,
    },

    /// The status query a resync starts with failed.
    #[error("status query failed: {0}")]
    StatusQuery(#[source] SourceError),

    #[error(transparent)]
    Store(#[from] DataStoreError),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Consumer-side reconciliation engine.
pub struct NotificationReconciler {
    store: Arc<dyn SubscriptionDataStore>,
    source: Arc<dyn SourceClient>,
    dispatcher: Arc<SignalDispatcher>,
    locks: KeyedLocks<SubscriptionId>,
}

impl NotificationReconciler {
    pub fn new(
        store: Arc<dyn SubscriptionDataStore>,
        source: Arc<dyn SourceClient>,
        dispatcher: Arc<SignalDispatcher>,
    ) -> Self {
        NotificationReconciler {
            store,
            source,
            dispatcher,
            locks: KeyedLocks::new(),
        }
    }

    // ─── Registration ───

    /// Starts mirroring a remote subscription.
    pub fn track(&self, data: SubscriptionData) -> Result<()> {
        info!(
            subscription_id = %data.id,
            remote_id = %data.remote_id,
            source = %data.source,
            topic = %data.topic,
            "tracking subscription"
        );
        self.store.insert(data)?;
        Ok(())
    }

    /// Stops mirroring. A pass already holding the lock finishes first.
    pub async fn untrack(&self, id: SubscriptionId) -> Result<SubscriptionData> {
        let removed = {
            let _guard = self.locks.lock(&id).await;
            self.store.remove(id).map_err(|e| match e {
                DataStoreError::NotFound(id) => ReconcileError::Unknown(id),
                other => other.into(),
            })?
        };
        self.locks.remove(&id);
        info!(subscription_id = %id, "untracked subscription");
        Ok(removed)
    }

    pub fn mirror(&self, id: SubscriptionId) -> Option<SubscriptionData> {
        self.store.get(id)
    }

    /// Resolves a `subscriptionRef` to the local mirror.
    pub fn find_by_remote(&self, remote_id: &str) -> Option<SubscriptionData> {
        self.store.find_by_remote(remote_id)
    }

    /// Snapshot of all mirrors. May race with in-flight passes.
    pub fn mirrors(&self) -> Vec<SubscriptionData> {
        self.store.list()
    }

    // ─── Reconciliation ───

    /// Runs one reconciliation pass for `envelope` against subscription `id`.
    ///
    /// Passes for the same subscription are serialized; the new position is
    /// persisted before any destination sees the resolved references.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::Unknown`] if `id` is not tracked.
    /// - [`ReconcileError::Recovery`] if the range query fails, or if it
    ///   comes back with a hole ([`SourceError::IncompleteRange`]). In the
    ///   hole case the mirror has already advanced to the end of the
    ///   contiguous run, so a retry asks only for what is still missing.
    /// - [`ReconcileError::Store`] if the new position cannot be persisted.
    ///   Nothing is dispatched in that case.
    #[instrument(skip(self, envelope), fields(subscription_id = %id, kind = %envelope.kind, position = %envelope.position()))]
    pub async fn reconcile(&self, id: SubscriptionId, envelope: &NotificationEnvelope) -> Result<ReconcileOutcome> {
        let _guard = self.locks.lock(&id).await;
        let mut data = self.store.get(id).ok_or(ReconcileError::Unknown(id))?;

        let received = data.events_received;
        let position = envelope.position();
        let expected = data.expected_next();

        if position < received {
            debug!(%received, "stale envelope");
            return Ok(ReconcileOutcome::Stale);
        }

        if position == received {
            data.last_update = Utc::now();
            data.status = envelope.status;
            self.store.update(&data)?;
            debug!("no new events");
            return Ok(ReconcileOutcome::Refreshed);
        }

        if position == expected
            && let Some(reference) = envelope.event(expected)
        {
            let reference = reference.to_string();
            data.events_received = expected;
            data.last_update = Utc::now();
            data.status = envelope.status;
            self.store.update(&data)?;

            self.dispatcher
                .dispatch(id, &data.topic, expected, &reference)
                .await;
            debug!(number = %expected, "delivered in order");
            return Ok(ReconcileOutcome::Delivered { number: expected });
        }

        let range = EventRange::new(expected, position);
        info!(%range, "gap detected, recovering");
        let references = self.recover(&data, range).await?;

        let reached = references.last().map(|(number, _)| *number);
        if let Some(reached) = reached {
            data.events_received = reached;
            data.last_update = Utc::now();
            data.status = envelope.status;
            self.store.update(&data)?;

            for (number, reference) in &references {
                self.dispatcher.dispatch(id, &data.topic, *number, reference).await;
            }
        }

        if reached != Some(position) {
            let missing = reached.map_or(expected, EventNumber::next);
            warn!(
                %range,
                %missing,
                dispatched = references.len(),
                "source returned an incomplete range, stopping at the gap"
            );
            return Err(ReconcileError::Recovery {
                range,
                source: SourceError::IncompleteRange { range, missing },
            });
        }

        info!(%range, dispatched = references.len(), "gap closed");
        Ok(ReconcileOutcome::Recovered {
            range,
            dispatched: references.len(),
        })
    }

    /// Queries `range` and returns the unbroken run of references starting at
    /// `range.since`, ascending and unique.
    ///
    /// Events outside the range are ignored, as is anything after the first
    /// missing number.
    async fn recover(&self, data: &SubscriptionData, range: EventRange) -> Result<Vec<(EventNumber, String)>> {
        let reply = self
            .source
            .query_events(data, range)
            .await
            .and_then(|reply| {
                reply.expect_kind(NotificationType::QueryEvent)?;
                Ok(reply)
            })
            .map_err(|source| {
                warn!(subscription_id = %data.id, %range, error = %source, "recovery query failed");
                ReconcileError::Recovery { range, source }
            })?;

        let recovered: BTreeMap<EventNumber, String> = reply
            .notification_event
            .into_iter()
            .filter(|e| range.contains(e.event_number))
            .map(|e| (e.event_number, e.focus.reference))
            .collect();

        let mut next = range.since;
        Ok(recovered
            .into_iter()
            .take_while(|(number, _)| {
                let contiguous = *number == next;
                next = next.next();
                contiguous
            })
            .collect())
    }

    /// Forces a pass from the source's current status.
    ///
    /// Used by the liveness watchdog when a subscription has gone quiet.
    ///
    /// # Errors
    ///
    /// As [`reconcile`](Self::reconcile), plus [`ReconcileError::StatusQuery`]
    /// when the status query itself fails.
    #[instrument(skip(self), fields(subscription_id = %id))]
    pub async fn resync(&self, id: SubscriptionId) -> Result<ReconcileOutcome> {
        let data = self.store.get(id).ok_or(ReconcileError::Unknown(id))?;

        let status = self
            .source
            .query_status(&data)
            .await
            .and_then(|reply| {
                reply.expect_kind(NotificationType::QueryStatus)?;
                Ok(reply)
            })
            .map_err(ReconcileError::StatusQuery)?;

        debug!(position = %status.position(), "source status");
        self.reconcile(id, &status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::store::InMemoryDataStore;
    use crate::signal::DestinationRegistry;
    use crate::test_utils::{MockSourceClient, RecordingDestination};
    use crate::types::{EventRecord, SubscriptionStatus, TopicDescriptor, TriggerOperation};
    use proptest::prelude::*;

    struct Fixture {
        reconciler: Arc<NotificationReconciler>,
        source: Arc<MockSourceClient>,
        destination: Arc<RecordingDestination>,
    }

    const ID: SubscriptionId = SubscriptionId(1);

    fn topic() -> TopicDescriptor {
        TopicDescriptor::new("Patient", TriggerOperation::Create)
    }

    fn fixture(received: u64) -> Fixture {
        let store = Arc::new(InMemoryDataStore::new());
        let source = Arc::new(MockSourceClient::new());
        let destination = Arc::new(RecordingDestination::new("engine"));
        let mut registry = DestinationRegistry::new();
        registry.bind(topic(), destination.clone(), None);
        let dispatcher = Arc::new(SignalDispatcher::new(registry));

        let reconciler = Arc::new(NotificationReconciler::new(store, source.clone(), dispatcher));
        let mut data = SubscriptionData::new(ID, "12", "http://source", topic(), 60);
        data.events_received = EventNumber(received);
        reconciler.track(data).unwrap();

        Fixture {
            reconciler,
            source,
            destination,
        }
    }

    fn heartbeat(position: u64) -> NotificationEnvelope {
        NotificationEnvelope::bare(
            NotificationType::Heartbeat,
            SubscriptionStatus::Active,
            EventNumber(position),
            "12",
            "patient-create",
        )
    }

    fn notification(position: u64, events: &[u64]) -> NotificationEnvelope {
        let records: Vec<EventRecord> = events
            .iter()
            .map(|n| EventRecord::new(*n, format!("Patient/{}", n * 2)))
            .collect();
        NotificationEnvelope::bare(
            NotificationType::EventNotification,
            SubscriptionStatus::Active,
            EventNumber(position),
            "12",
            "patient-create",
        )
        .with_events(&records)
    }

    fn received(f: &Fixture) -> EventNumber {
        f.reconciler.mirror(ID).unwrap().events_received
    }

    // ─── In-order delivery ───

    #[tokio::test]
    async fn next_event_is_dispatched_once() {
        let f = fixture(4);
        let envelope = NotificationEnvelope::bare(
            NotificationType::EventNotification,
            SubscriptionStatus::Active,
            EventNumber(5),
            "12",
            "patient-create",
        )
        .with_events(&[EventRecord::new(5, "Patient/10")]);

        let outcome = f.reconciler.reconcile(ID, &envelope).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Delivered { number: EventNumber(5) });
        assert_eq!(f.destination.payloads(), vec!["Patient/10"]);
        assert_eq!(received(&f), EventNumber(5));
        assert!(f.source.event_queries().is_empty());
    }

    // ─── Gap recovery ───

    #[tokio::test]
    async fn heartbeat_ahead_recovers_range_in_order() {
        let f = fixture(4);
        f.source.set_position(8);
        for n in 5..=8 {
            f.source.add_event(n, &format!("Patient/{}", n * 2));
        }

        let outcome = f.reconciler.reconcile(ID, &heartbeat(8)).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Recovered {
                range: EventRange::new(5, 8),
                dispatched: 4
            }
        );
        assert_eq!(f.source.event_queries(), vec![EventRange::new(5, 8)]);
        assert_eq!(
            f.destination.payloads(),
            vec!["Patient/10", "Patient/12", "Patient/14", "Patient/16"]
        );
        assert_eq!(received(&f), EventNumber(8));
    }

    #[tokio::test]
    async fn notification_ahead_recovery_supersedes_carried_events() {
        let f = fixture(4);
        f.source.set_position(7);
        for n in 5..=7 {
            f.source.add_event(n, &format!("Patient/{}", n * 2));
        }

        // Carries 7 only; 5 and 6 were lost.
        let outcome = f.reconciler.reconcile(ID, &notification(7, &[7])).await.unwrap();

        assert_eq!(outcome.dispatched(), 3);
        assert_eq!(f.source.event_queries(), vec![EventRange::new(5, 7)]);
        assert_eq!(f.destination.payloads(), vec!["Patient/10", "Patient/12", "Patient/14"]);
    }

    #[tokio::test]
    async fn heartbeat_announcing_one_event_is_recovered() {
        let f = fixture(4);
        f.source.add_event(5, "Patient/10");

        let outcome = f.reconciler.reconcile(ID, &heartbeat(5)).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Recovered {
                range: EventRange::new(5, 5),
                dispatched: 1
            }
        );
        assert_eq!(f.destination.payloads(), vec!["Patient/10"]);
    }

    #[tokio::test]
    async fn failed_recovery_leaves_state_untouched() {
        let f = fixture(4);
        let before = f.reconciler.mirror(ID).unwrap();
        f.source.fail_next_event_query(SourceError::Status(503));

        let err = f.reconciler.reconcile(ID, &heartbeat(8)).await.unwrap_err();

        assert!(matches!(err, ReconcileError::Recovery { .. }));
        assert_eq!(f.reconciler.mirror(ID).unwrap(), before);
        assert!(f.destination.payloads().is_empty());

        // The whole gap is retried on the next envelope.
        for n in 5..=8 {
            f.source.add_event(n, &format!("Patient/{}", n));
        }
        f.reconciler.reconcile(ID, &heartbeat(8)).await.unwrap();
        assert_eq!(
            f.source.event_queries(),
            vec![EventRange::new(5, 8), EventRange::new(5, 8)]
        );
        assert_eq!(received(&f), EventNumber(8));
    }

    #[tokio::test]
    async fn incomplete_recovery_stops_at_the_gap() {
        let f = fixture(4);
        f.source.add_event(5, "Patient/5");
        f.source.add_event(7, "Patient/7");
        // Outside the requested range; must be ignored.
        f.source.add_event(9, "Patient/9");

        let err = f.reconciler.reconcile(ID, &heartbeat(7)).await.unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::Recovery {
                source: SourceError::IncompleteRange {
                    missing: EventNumber(6),
                    ..
                },
                ..
            }
        ));
        assert_eq!(f.destination.payloads(), vec!["Patient/5"]);
        assert_eq!(received(&f), EventNumber(5));

        // Once the source has the missing event, the rest of the gap closes.
        f.source.add_event(6, "Patient/6");
        let outcome = f.reconciler.reconcile(ID, &heartbeat(7)).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Recovered {
                range: EventRange::new(6, 7),
                dispatched: 2
            }
        );
        assert_eq!(f.destination.payloads(), vec!["Patient/5", "Patient/6", "Patient/7"]);
        assert_eq!(received(&f), EventNumber(7));
    }

    #[tokio::test]
    async fn empty_recovery_reply_keeps_event_for_redelivery() {
        let f = fixture(4);
        let before = f.reconciler.mirror(ID).unwrap();

        let err = f.reconciler.reconcile(ID, &heartbeat(5)).await.unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::Recovery {
                source: SourceError::IncompleteRange {
                    missing: EventNumber(5),
                    ..
                },
                ..
            }
        ));
        assert_eq!(f.reconciler.mirror(ID).unwrap(), before);

        // The event arrives later on its own notification and is delivered.
        let envelope = NotificationEnvelope::bare(
            NotificationType::EventNotification,
            SubscriptionStatus::Active,
            EventNumber(5),
            "12",
            "patient-create",
        )
        .with_events(&[EventRecord::new(5, "Patient/10")]);
        let outcome = f.reconciler.reconcile(ID, &envelope).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Delivered { number: EventNumber(5) });
        assert_eq!(f.destination.payloads(), vec!["Patient/10"]);
    }

    #[tokio::test]
    async fn mirror_at_max_position_never_overflows() {
        let f = fixture(u64::MAX);

        for _ in 0..2 {
            let outcome = f.reconciler.reconcile(ID, &heartbeat(u64::MAX)).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::Refreshed);
        }
        let outcome = f.reconciler.reconcile(ID, &heartbeat(3)).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Stale);
        assert_eq!(received(&f), EventNumber::MAX);
    }

    // ─── Stale and duplicate input ───

    #[tokio::test]
    async fn behind_position_is_full_noop() {
        let f = fixture(4);
        let before = f.reconciler.mirror(ID).unwrap();

        let outcome = f.reconciler.reconcile(ID, &notification(3, &[3])).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Stale);
        assert_eq!(f.reconciler.mirror(ID).unwrap(), before);
        assert!(f.destination.payloads().is_empty());
    }

    #[tokio::test]
    async fn at_position_refreshes_timestamp_only() {
        let f = fixture(4);
        let before = f.reconciler.mirror(ID).unwrap();

        let outcome = f.reconciler.reconcile(ID, &heartbeat(4)).await.unwrap();

        let after = f.reconciler.mirror(ID).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Refreshed);
        assert_eq!(after.events_received, EventNumber(4));
        assert!(after.last_update >= before.last_update);
        assert_eq!(after.status, SubscriptionStatus::Active);
        assert!(f.destination.payloads().is_empty());
        assert!(f.source.event_queries().is_empty());
    }

    #[tokio::test]
    async fn redelivered_envelope_dispatches_once() {
        let f = fixture(4);
        let envelope = notification(5, &[5]);

        f.reconciler.reconcile(ID, &envelope).await.unwrap();
        let second = f.reconciler.reconcile(ID, &envelope).await.unwrap();

        assert_eq!(second, ReconcileOutcome::Refreshed);
        assert_eq!(f.destination.payloads().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_envelopes_recover_gap_once() {
        let f = fixture(4);
        for n in 5..=8 {
            f.source.add_event(n, &format!("Patient/{}", n));
        }

        let a = {
            let r = f.reconciler.clone();
            tokio::spawn(async move { r.reconcile(ID, &heartbeat(8)).await })
        };
        let b = {
            let r = f.reconciler.clone();
            tokio::spawn(async move { r.reconcile(ID, &heartbeat(8)).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(f.source.event_queries().len(), 1);
        assert_eq!(f.destination.payloads().len(), 4);
    }

    // ─── Registration and resync ───

    #[tokio::test]
    async fn unknown_subscription_is_error() {
        let f = fixture(0);
        let err = f
            .reconciler
            .reconcile(SubscriptionId(99), &heartbeat(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Unknown(SubscriptionId(99))));
    }

    #[tokio::test]
    async fn untrack_removes_mirror() {
        let f = fixture(0);
        f.reconciler.untrack(ID).await.unwrap();
        assert!(f.reconciler.mirror(ID).is_none());
        assert!(matches!(
            f.reconciler.untrack(ID).await,
            Err(ReconcileError::Unknown(_))
        ));
    }

    #[tokio::test]
    async fn resync_uses_status_position() {
        let f = fixture(2);
        f.source.set_position(4);
        f.source.add_event(3, "Patient/3");
        f.source.add_event(4, "Patient/4");

        let outcome = f.reconciler.resync(ID).await.unwrap();

        assert_eq!(outcome.dispatched(), 2);
        assert_eq!(f.source.status_queries(), 1);
        assert_eq!(received(&f), EventNumber(4));
    }

    #[tokio::test]
    async fn resync_status_failure_is_surfaced() {
        let f = fixture(2);
        f.source.fail_next_status_query(SourceError::Timeout);

        let err = f.reconciler.resync(ID).await.unwrap_err();

        assert!(matches!(err, ReconcileError::StatusQuery(SourceError::Timeout)));
        assert_eq!(received(&f), EventNumber(2));
    }

    // ─── Properties ───

    proptest! {
        /// Whatever order and multiplicity envelopes arrive in, every event
        /// number is dispatched at most once and the position never decreases.
        #[test]
        fn at_most_once_and_monotonic(positions in prop::collection::vec(0u64..12, 1..25)) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(async {
                let f = fixture(0);
                f.source.set_position(12);
                for n in 1..=12 {
                    f.source.add_event(n, &format!("Patient/{}", n));
                }

                let mut previous = EventNumber::ZERO;
                for position in positions {
                    let envelope = if position == 0 {
                        heartbeat(0)
                    } else {
                        notification(position, &[position])
                    };
                    f.reconciler.reconcile(ID, &envelope).await.unwrap();

                    let now = received(&f);
                    prop_assert!(now >= previous);
                    previous = now;
                }

                let payloads = f.destination.payloads();
                let mut unique = payloads.clone();
                unique.sort();
                unique.dedup();
                prop_assert_eq!(unique.len(), payloads.len());
                prop_assert_eq!(payloads.len() as u64, previous.0);
                Ok(())
            })?;
        }

        /// Recovery ranges start right after the recorded position and end at
        /// the reported one, and successive ranges never overlap.
        #[test]
        fn gap_ranges_are_contiguous(steps in prop::collection::vec(1u64..5, 1..10)) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(async {
                let f = fixture(0);
                let total: u64 = steps.iter().sum();
                for n in 1..=total {
                    f.source.add_event(n, &format!("Patient/{}", n));
                }

                let mut position = 0;
                for step in &steps {
                    position += step;
                    f.reconciler.reconcile(ID, &heartbeat(position)).await.unwrap();
                }

                let queries = f.source.event_queries();
                let mut next = 1;
                for range in &queries {
                    prop_assert_eq!(range.since, EventNumber(next));
                    next = range.until.0 + 1;
                }
                prop_assert_eq!(next, total + 1);
                Ok(())
            })?;
        }
    }
}
