//! Outbound delivery for publisher-side subscriptions.
//!
//! The engine owns the lifecycle of a subscription from the source's point of
//! view: it stores it, schedules the handshake and heartbeat cadence, numbers
//! new events, sends envelopes to the callback, and turns each send outcome
//! into a status transition.
//!
//! Send failures never escape as errors. A failed send flips the subscription
//! to `error` and the next heartbeat is the retry. The only errors returned are
//! about the subscription itself (unknown id, invalid request).

use std::sync::{Arc, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::callback::CallbackClient;
use super::store::{NewSubscription, StoreError, SubscriptionStore};
use crate::locks::KeyedLocks;
use crate::notification::{EventRange, NotificationEnvelope, NotificationType};
use crate::scheduler::PeriodicTaskScheduler;
use crate::types::{Subscription, SubscriptionId, SubscriptionStatus, TaskKey, Topic, TopicId};

/// Errors returned by publisher operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublisherError {
    #[error("subscription not found: {0}")]
    NotFound(SubscriptionId),

    #[error("unknown topic: {0}")]
    UnknownTopic(TopicId),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for PublisherError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => PublisherError::NotFound(id),
            StoreError::UnknownTopic(topic) => PublisherError::UnknownTopic(topic),
            other => PublisherError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PublisherError>;

/// Drives handshakes, heartbeats and event notifications.
pub struct PublisherDeliveryEngine {
    store: Arc<dyn SubscriptionStore>,
    client: Arc<dyn CallbackClient>,
    scheduler: Arc<PeriodicTaskScheduler<TaskKey>>,

    /// Serializes sends per subscription so envelopes leave in counter order
    /// and status writes never interleave.
    locks: KeyedLocks<SubscriptionId>,

    /// Delay between subscribe and handshake; heartbeats start one period later.
    handshake_delay: Duration,

    /// Handle to ourselves for scheduled closures. Weak so the scheduler does
    /// not keep the engine alive.
    this: Weak<PublisherDeliveryEngine>,
}

impl PublisherDeliveryEngine {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        client: Arc<dyn CallbackClient>,
        scheduler: Arc<PeriodicTaskScheduler<TaskKey>>,
        handshake_delay: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| PublisherDeliveryEngine {
            store,
            client,
            scheduler,
            locks: KeyedLocks::new(),
            handshake_delay,
            this: this.clone(),
        })
    }

    // ─── Topics and snapshots ───

    /// Registers a topic subscriptions can bind to.
    pub fn register_topic(&self, topic: Topic) -> Result<()> {
        info!(topic = %topic.id, descriptor = %topic.descriptor, "registering topic");
        self.store.insert_topic(topic)?;
        Ok(())
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.store.topics()
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<Subscription> {
        self.store.get(id)
    }

    /// Snapshot of all subscriptions. May race with in-flight sends.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.store.list()
    }

    // ─── Lifecycle ───

    /// Stores a new subscription and starts its delivery cadence.
    ///
    /// The handshake fires once after the handshake delay. Heartbeats start
    /// one period after the handshake and repeat every period.
    pub fn subscribe(&self, request: NewSubscription) -> Result<Subscription> {
        let subscription = self.store.create(request)?;
        info!(
            subscription_id = %subscription.id,
            topic = %subscription.topic,
            callback = %subscription.callback,
            heartbeat_secs = subscription.heartbeat_period_secs,
            "subscription created"
        );
        self.start_delivery(&subscription);
        Ok(subscription)
    }

    fn start_delivery(&self, subscription: &Subscription) {
        let id = subscription.id;
        let period = subscription.heartbeat_period();

        let this = self.this.clone();
        self.scheduler.schedule_once(self.handshake_delay, async move {
            if let Some(engine) = this.upgrade() {
                // Outcome is recorded as status; NotFound means it was deleted.
                let _ = engine.send_handshake(id).await;
            }
        });

        let this = self.this.clone();
        self.scheduler.schedule(
            TaskKey::Heartbeat(id),
            self.handshake_delay + period,
            period,
            move || {
                let this = this.clone();
                async move {
                    if let Some(engine) = this.upgrade() {
                        let _ = engine.send_heartbeat(id).await;
                    }
                }
            },
        );
    }

    /// Deletes the subscription, its event records, and its heartbeat.
    ///
    /// A send already in flight completes; its status write finds nothing.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<Subscription> {
        self.scheduler.cancel(&TaskKey::Heartbeat(id));
        let removed = self.store.remove(id)?;
        self.locks.remove(&id);
        info!(subscription_id = %id, "subscription removed");
        Ok(removed)
    }

    // ─── Sends ───

    /// Sends the one-time handshake. Returns the resulting status.
    pub async fn send_handshake(&self, id: SubscriptionId) -> Result<SubscriptionStatus> {
        self.send_bare(id, NotificationType::Handshake).await
    }

    /// Sends a heartbeat carrying the current counter. Returns the resulting status.
    pub async fn send_heartbeat(&self, id: SubscriptionId) -> Result<SubscriptionStatus> {
        self.send_bare(id, NotificationType::Heartbeat).await
    }

    async fn send_bare(&self, id: SubscriptionId, kind: NotificationType) -> Result<SubscriptionStatus> {
        let _guard = self.locks.lock(&id).await;
        let subscription = self.store.get(id).ok_or(PublisherError::NotFound(id))?;

        let envelope = NotificationEnvelope::bare(
            kind,
            subscription.status,
            subscription.last_event_number,
            id.to_string(),
            subscription.topic.as_str(),
        );
        debug!(subscription_id = %id, %kind, position = %subscription.last_event_number, "sending");
        self.deliver(&subscription, &envelope).await
    }

    /// Numbers `references` consecutively and notifies the callback.
    ///
    /// The counter and event records are committed together, before the
    /// send; the status is written after it, from the send outcome. These are
    /// two writes, not one: a range query triggered by this very notification
    /// has to find the records already stored. A failed send therefore keeps
    /// its numbers and the next heartbeat announces them.
    ///
    /// An empty list is a no-op that returns the current status.
    ///
    /// # Errors
    ///
    /// - [`PublisherError::NotFound`] if the subscription does not exist
    /// - [`PublisherError::Store`] if the counter cannot advance
    #[instrument(skip(self, references), fields(subscription_id = %id, count = references.len()))]
    pub async fn send_events(&self, id: SubscriptionId, references: Vec<String>) -> Result<SubscriptionStatus> {
        let _guard = self.locks.lock(&id).await;

        if references.is_empty() {
            let subscription = self.store.get(id).ok_or(PublisherError::NotFound(id))?;
            return Ok(subscription.status);
        }

        let (subscription, records) = self.store.record_events(id, &references)?;
        let envelope = NotificationEnvelope::bare(
            NotificationType::EventNotification,
            subscription.status,
            subscription.last_event_number,
            id.to_string(),
            subscription.topic.as_str(),
        )
        .with_events(&records);

        if let (Some(first), Some(last)) = (records.first(), records.last()) {
            info!(first = %first.number, last = %last.number, "notifying events");
        }
        self.deliver(&subscription, &envelope).await
    }

    /// Sends `references` to every subscription bound to `topic`.
    ///
    /// Subscriptions are notified in parallel. Returns how many were notified.
    pub async fn notify_topic(&self, topic: &TopicId, references: Vec<String>) -> Result<usize> {
        if self.store.topic(topic).is_none() {
            return Err(PublisherError::UnknownTopic(topic.clone()));
        }
        let Some(engine) = self.this.upgrade() else {
            return Ok(0);
        };

        let subscriptions = self.store.subscribed_to(topic);
        let mut sends = JoinSet::new();
        for subscription in &subscriptions {
            let engine = Arc::clone(&engine);
            let references = references.clone();
            let id = subscription.id;
            sends.spawn(async move { (id, engine.send_events(id, references).await) });
        }

        let mut notified = 0;
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, Ok(_))) => notified += 1,
                Ok((id, Err(e))) => debug!(subscription_id = %id, error = %e, "skipped during fan-out"),
                Err(e) => warn!(topic = %topic, error = %e, "fan-out send panicked"),
            }
        }

        info!(topic = %topic, notified, count = references.len(), "topic notified");
        Ok(notified)
    }

    /// Performs the callback send and records the resulting status.
    async fn deliver(&self, subscription: &Subscription, envelope: &NotificationEnvelope) -> Result<SubscriptionStatus> {
        let id = subscription.id;
        let outcome = self.client.send(&subscription.callback, envelope).await;
        if let Err(e) = &outcome {
            warn!(subscription_id = %id, kind = %envelope.kind, error = %e, "callback send failed");
        }

        let status = SubscriptionStatus::after_send(outcome.is_ok());
        if status != subscription.status {
            info!(subscription_id = %id, from = %subscription.status, to = %status, "status changed");
        }

        match self.store.set_status(id, status) {
            Ok(()) => Ok(status),
            Err(StoreError::NotFound(_)) => {
                debug!(subscription_id = %id, "subscription removed during send");
                Err(PublisherError::NotFound(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ─── Queries ───

    /// Builds a `query-status` envelope from current state.
    pub fn handle_status_query(&self, id: SubscriptionId) -> Result<NotificationEnvelope> {
        let subscription = self.store.get(id).ok_or(PublisherError::NotFound(id))?;
        Ok(NotificationEnvelope::bare(
            NotificationType::QueryStatus,
            subscription.status,
            subscription.last_event_number,
            id.to_string(),
            subscription.topic.as_str(),
        ))
    }

    /// Builds a `query-event` envelope listing the events in `range`.
    ///
    /// An inverted or empty range yields an empty list.
    pub fn handle_event_query(&self, id: SubscriptionId, range: EventRange) -> Result<NotificationEnvelope> {
        let subscription = self.store.get(id).ok_or(PublisherError::NotFound(id))?;
        let events = self.store.events_in(id, range)?;
        debug!(subscription_id = %id, %range, found = events.len(), "event query");
        Ok(NotificationEnvelope::bare(
            NotificationType::QueryEvent,
            subscription.status,
            subscription.last_event_number,
            id.to_string(),
            subscription.topic.as_str(),
        )
        .with_events(&events))
    }
}
