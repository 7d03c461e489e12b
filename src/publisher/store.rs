//! Publisher-side subscription registry.
//!
//! The registry is an external collaborator; the engine only needs the narrow
//! contract in [`SubscriptionStore`]. [`InMemorySubscriptionStore`] is the
//! implementation used by the binary and the tests.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notification::EventRange;
use crate::types::{
    EventNumber, EventRecord, Subscription, SubscriptionId, SubscriptionStatus, Topic, TopicId,
};

/// Errors returned by the subscription registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("subscription not found: {0}")]
    NotFound(SubscriptionId),

    #[error("unknown topic: {0}")]
    UnknownTopic(TopicId),

    #[error("topic already exists: {0}")]
    TopicExists(TopicId),

    #[error("heartbeat period must be at least one second")]
    InvalidHeartbeatPeriod,

    #[error("callback address must not be empty")]
    MissingCallback,

    /// The subscription's counter cannot advance any further.
    #[error("event counter exhausted for subscription {0}")]
    CounterExhausted(SubscriptionId),
}

/// Subscribe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    pub callback: String,
    pub topic: TopicId,
    #[serde(rename = "heartbeatPeriod")]
    pub heartbeat_period_secs: u64,
}

/// Read/write contract the delivery engine needs from the registry.
pub trait SubscriptionStore: Send + Sync {
    /// Registers a topic. Topics are immutable once registered.
    fn insert_topic(&self, topic: Topic) -> Result<(), StoreError>;

    fn topic(&self, id: &TopicId) -> Option<Topic>;

    fn topics(&self) -> Vec<Topic>;

    /// Stores a new subscription with status `requested` and counter 0.
    fn create(&self, request: NewSubscription) -> Result<Subscription, StoreError>;

    fn get(&self, id: SubscriptionId) -> Option<Subscription>;

    fn list(&self) -> Vec<Subscription>;

    /// All subscriptions bound to `topic`.
    fn subscribed_to(&self, topic: &TopicId) -> Vec<Subscription>;

    /// Deletes the subscription and its event records.
    fn remove(&self, id: SubscriptionId) -> Result<Subscription, StoreError>;

    fn set_status(&self, id: SubscriptionId, status: SubscriptionStatus) -> Result<(), StoreError>;

    /// Assigns consecutive numbers to `references` and records them.
    ///
    /// The counter advance and the records are committed together. Returns the
    /// updated subscription and the new records in ascending order.
    fn record_events(
        &self,
        id: SubscriptionId,
        references: &[String],
    ) -> Result<(Subscription, Vec<EventRecord>), StoreError>;

    /// Recorded events numbered within `range`, ascending.
    fn events_in(&self, id: SubscriptionId, range: EventRange) -> Result<Vec<EventRecord>, StoreError>;
}

struct Entry {
    subscription: Subscription,
    /// Ascending by number, contiguous from 1.
    events: Vec<EventRecord>,
}

#[derive(Default)]
struct Inner {
    topics: HashMap<TopicId, Topic>,
    subscriptions: HashMap<SubscriptionId, Entry>,
    next_id: u64,
}

/// Subscription registry held in memory.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    inner: RwLock<Inner>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl SubscriptionStore for InMemorySubscriptionStore {
    fn insert_topic(&self, topic: Topic) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.topics.contains_key(&topic.id) {
            return Err(StoreError::TopicExists(topic.id));
        }
        inner.topics.insert(topic.id.clone(), topic);
        Ok(())
    }

    fn topic(&self, id: &TopicId) -> Option<Topic> {
        self.read().topics.get(id).cloned()
    }

    fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.read().topics.values().cloned().collect();
        topics.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        topics
    }

    fn create(&self, request: NewSubscription) -> Result<Subscription, StoreError> {
        if request.callback.trim().is_empty() {
            return Err(StoreError::MissingCallback);
        }
        if request.heartbeat_period_secs == 0 {
            return Err(StoreError::InvalidHeartbeatPeriod);
        }

        let mut inner = self.write();
        if !inner.topics.contains_key(&request.topic) {
            return Err(StoreError::UnknownTopic(request.topic));
        }

        inner.next_id += 1;
        let subscription = Subscription {
            id: SubscriptionId(inner.next_id),
            callback: request.callback,
            topic: request.topic,
            heartbeat_period_secs: request.heartbeat_period_secs,
            status: SubscriptionStatus::Requested,
            last_event_number: EventNumber::ZERO,
            created_at: Utc::now(),
        };
        inner.subscriptions.insert(
            subscription.id,
            Entry {
                subscription: subscription.clone(),
                events: Vec::new(),
            },
        );
        Ok(subscription)
    }

    fn get(&self, id: SubscriptionId) -> Option<Subscription> {
        self.read()
            .subscriptions
            .get(&id)
            .map(|e| e.subscription.clone())
    }

    fn list(&self) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self
            .read()
            .subscriptions
            .values()
            .map(|e| e.subscription.clone())
            .collect();
        subs.sort_by_key(|s| s.id);
        subs
    }

    fn subscribed_to(&self, topic: &TopicId) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self
            .read()
            .subscriptions
            .values()
            .filter(|e| &e.subscription.topic == topic)
            .map(|e| e.subscription.clone())
            .collect();
        subs.sort_by_key(|s| s.id);
        subs
    }

    fn remove(&self, id: SubscriptionId) -> Result<Subscription, StoreError> {
        self.write()
            .subscriptions
            .remove(&id)
            .map(|e| e.subscription)
            .ok_or(StoreError::NotFound(id))
    }

    fn set_status(&self, id: SubscriptionId, status: SubscriptionStatus) -> Result<(), StoreError> {
        let mut inner = self.write();
        let entry = inner
            .subscriptions
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        entry.subscription.status = status;
        Ok(())
    }

    fn record_events(
        &self,
        id: SubscriptionId,
        references: &[String],
    ) -> Result<(Subscription, Vec<EventRecord>), StoreError> {
        let mut inner = self.write();
        let entry = inner
            .subscriptions
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;

        let mut number = entry.subscription.last_event_number;
        let records = references
            .iter()
            .map(|reference| {
                number = number
                    .checked_next()
                    .filter(|n| *n < EventNumber::MAX)
                    .ok_or(StoreError::CounterExhausted(id))?;
                Ok(EventRecord::new(number, reference.clone()))
            })
            .collect::<Result<Vec<EventRecord>, StoreError>>()?;

        entry.subscription.last_event_number = number;
        entry.events.extend(records.iter().cloned());
        Ok((entry.subscription.clone(), records))
    }

    fn events_in(&self, id: SubscriptionId, range: EventRange) -> Result<Vec<EventRecord>, StoreError> {
        let inner = self.read();
        let entry = inner.subscriptions.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(entry
            .events
            .iter()
            .filter(|e| range.contains(e.number))
            .cloned()
            .collect())
    }
}
