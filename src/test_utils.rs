//! Shared test doubles for the network-facing collaborators.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::consumer::{SourceClient, SourceError};
use crate::notification::{EventRange, NotificationEnvelope, NotificationType};
use crate::publisher::{CallbackClient, CallbackError};
use crate::signal::Destination;
use crate::types::{EventNumber, EventRecord, SubscriptionData, SubscriptionStatus};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ─── Callback ───

/// Records every send; succeeds unless a failure was queued.
#[derive(Default)]
pub struct MockCallbackClient {
    sent: Mutex<Vec<(String, NotificationEnvelope)>>,
    failures: Mutex<VecDeque<CallbackError>>,
}

impl MockCallbackClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next send fail with `err`.
    pub fn fail_next(&self, err: CallbackError) {
        lock(&self.failures).push_back(err);
    }

    /// All sends so far as `(callback, envelope)`, failed ones included.
    pub fn sent(&self) -> Vec<(String, NotificationEnvelope)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl CallbackClient for MockCallbackClient {
    async fn send(&self, callback: &str, envelope: &NotificationEnvelope) -> Result<(), CallbackError> {
        lock(&self.sent).push((callback.to_string(), envelope.clone()));
        match lock(&self.failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// ─── Source ───

/// In-memory source: answers status and range queries from stored events.
#[derive(Default)]
pub struct MockSourceClient {
    events: Mutex<BTreeMap<EventNumber, String>>,
    position: Mutex<EventNumber>,
    event_queries: Mutex<Vec<EventRange>>,
    status_queries: Mutex<usize>,
    status_failures: Mutex<VecDeque<SourceError>>,
    event_failures: Mutex<VecDeque<SourceError>>,
}

impl MockSourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&self, number: u64, reference: &str) {
        lock(&self.events).insert(EventNumber(number), reference.to_string());
    }

    /// Sets the counter reported by status queries.
    pub fn set_position(&self, position: u64) {
        *lock(&self.position) = EventNumber(position);
    }

    pub fn fail_next_status_query(&self, err: SourceError) {
        lock(&self.status_failures).push_back(err);
    }

    pub fn fail_next_event_query(&self, err: SourceError) {
        lock(&self.event_failures).push_back(err);
    }

    /// Ranges requested so far, failed ones included.
    pub fn event_queries(&self) -> Vec<EventRange> {
        lock(&self.event_queries).clone()
    }

    pub fn status_queries(&self) -> usize {
        *lock(&self.status_queries)
    }

    fn current_position(&self) -> EventNumber {
        let stored = *lock(&self.position);
        let highest = lock(&self.events)
            .keys()
            .next_back()
            .copied()
            .unwrap_or_default();
        stored.max(highest)
    }
}

#[async_trait]
impl SourceClient for MockSourceClient {
    async fn query_status(&self, subscription: &SubscriptionData) -> Result<NotificationEnvelope, SourceError> {
        *lock(&self.status_queries) += 1;
        if let Some(err) = lock(&self.status_failures).pop_front() {
            return Err(err);
        }
        Ok(NotificationEnvelope::bare(
            NotificationType::QueryStatus,
            SubscriptionStatus::Active,
            self.current_position(),
            subscription.remote_id.clone(),
            "topic",
        ))
    }

    async fn query_events(
        &self,
        subscription: &SubscriptionData,
        range: EventRange,
    ) -> Result<NotificationEnvelope, SourceError> {
        lock(&self.event_queries).push(range);
        if let Some(err) = lock(&self.event_failures).pop_front() {
            return Err(err);
        }
        let records: Vec<EventRecord> = lock(&self.events)
            .iter()
            .filter(|(n, _)| range.contains(**n))
            .map(|(n, r)| EventRecord::new(*n, r.clone()))
            .collect();
        Ok(NotificationEnvelope::bare(
            NotificationType::QueryEvent,
            SubscriptionStatus::Active,
            self.current_position(),
            subscription.remote_id.clone(),
            "topic",
        )
        .with_events(&records))
    }
}

// ─── Destination ───

/// Records every `(signal, payload)` it receives.
pub struct RecordingDestination {
    id: String,
    succeed: bool,
    received: Mutex<Vec<(String, String)>>,
}

impl RecordingDestination {
    pub fn new(id: &str) -> Self {
        RecordingDestination {
            id: id.to_string(),
            succeed: true,
            received: Mutex::new(Vec::new()),
        }
    }

    /// A destination that records, then reports failure.
    pub fn failing(id: &str) -> Self {
        RecordingDestination {
            succeed: false,
            ..Self::new(id)
        }
    }

    pub fn received(&self) -> Vec<(String, String)> {
        lock(&self.received).clone()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.received().into_iter().map(|(_, p)| p).collect()
    }
}

#[async_trait]
impl Destination for RecordingDestination {
    fn id(&self) -> String {
        format!("recording:{}", self.id)
    }

    async fn deliver(&self, signal_name: &str, payload: &str) -> bool {
        lock(&self.received).push((signal_name.to_string(), payload.to_string()));
        self.succeed
    }
}
