//! Subscription records for both ends of the protocol.
//!
//! - [`Subscription`] lives on the publisher: where to send, how often to
//!   heartbeat, and the last event number handed out.
//! - [`SubscriptionData`] lives on the consumer: a local mirror of a remote
//!   subscription plus the last event number that was processed.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EventNumber, SubscriptionId, TopicId};

/// Health of a subscription as seen through its last send attempt.
///
/// ```text
/// REQUESTED ──handshake/heartbeat ok──► ACTIVE ◄──send ok── ERROR
///                                          └──────send failed──►┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Requested,
    Active,
    Error,
}

impl SubscriptionStatus {
    /// Status that follows a send attempt with the given outcome.
    ///
    /// Every successful send activates the subscription, every failed send
    /// flips it to error. There is no path back to `Requested`.
    pub fn after_send(succeeded: bool) -> Self {
        if succeeded {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Error
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubscriptionStatus::Requested => "requested",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Operation on a resource that triggers a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOperation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for TriggerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerOperation::Create => "create",
            TriggerOperation::Update => "update",
            TriggerOperation::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Which resource type and operation a topic covers.
///
/// This is what the consumer keys downstream destinations on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDescriptor {
    pub resource_type: String,
    pub operation: TriggerOperation,
}

impl TopicDescriptor {
    pub fn new(resource_type: impl Into<String>, operation: TriggerOperation) -> Self {
        TopicDescriptor {
            resource_type: resource_type.into(),
            operation,
        }
    }

    /// Default signal name for downstream destinations, e.g. `Patient-create`.
    pub fn signal_name(&self) -> String {
        format!("{}-{}", self.resource_type, self.operation)
    }
}

impl fmt::Display for TopicDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}?{}", self.resource_type, self.operation)
    }
}

/// A publisher-side topic. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: TopicId,
    pub name: String,
    #[serde(flatten)]
    pub descriptor: TopicDescriptor,
}

impl Topic {
    pub fn new(id: impl Into<String>, name: impl Into<String>, descriptor: TopicDescriptor) -> Self {
        Topic {
            id: TopicId(id.into()),
            name: name.into(),
            descriptor,
        }
    }
}

/// One numbered change notified on a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub number: EventNumber,
    pub reference: String,
}

impl EventRecord {
    pub fn new(number: impl Into<EventNumber>, reference: impl Into<String>) -> Self {
        EventRecord {
            number: number.into(),
            reference: reference.into(),
        }
    }
}

/// Publisher-side subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: SubscriptionId,
    /// Address that handshakes, heartbeats and notifications are POSTed to.
    pub callback: String,
    pub topic: TopicId,
    pub heartbeat_period_secs: u64,
    pub status: SubscriptionStatus,
    /// Highest event number assigned so far. Never decreases.
    pub last_event_number: EventNumber,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_period_secs)
    }
}

/// Consumer-side mirror of a remote subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionData {
    pub id: SubscriptionId,
    /// The id the source assigned (`subscriptionRef` on the wire).
    pub remote_id: String,
    /// Base URL of the source server, used for status and range queries.
    pub source: String,
    pub topic: TopicDescriptor,
    /// Last processed event number. Never decreases.
    pub events_received: EventNumber,
    pub status: SubscriptionStatus,
    pub last_update: DateTime<Utc>,
    pub heartbeat_period_secs: u64,
    /// Whether the liveness watchdog checks this subscription.
    #[serde(default = "default_liveness_check")]
    pub liveness_check: bool,
}

fn default_liveness_check() -> bool {
    true
}

impl SubscriptionData {
    /// Creates a mirror that has processed nothing yet.
    pub fn new(
        id: SubscriptionId,
        remote_id: impl Into<String>,
        source: impl Into<String>,
        topic: TopicDescriptor,
        heartbeat_period_secs: u64,
    ) -> Self {
        SubscriptionData {
            id,
            remote_id: remote_id.into(),
            source: source.into(),
            topic,
            events_received: EventNumber::ZERO,
            status: SubscriptionStatus::Requested,
            last_update: Utc::now(),
            heartbeat_period_secs,
            liveness_check: true,
        }
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_period_secs)
    }

    /// The event number the next in-order notification must carry.
    pub fn expected_next(&self) -> EventNumber {
        self.events_received.next()
    }
}
