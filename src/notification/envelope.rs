//! The notification envelope exchanged in both directions.
//!
//! ```json
//! {
//!   "type": "event-notification",
//!   "status": "active",
//!   "eventsSinceSubscriptionStart": 5,
//!   "subscriptionRef": "12",
//!   "topicRef": "patient-create",
//!   "notificationEvent": [
//!     { "eventNumber": 5, "focus": { "reference": "Patient/10" } }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EventNumber, EventRecord, SubscriptionStatus};

/// Errors raised when a payload does not have the shape the protocol requires.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The body is not valid JSON or lacks required fields.
    #[error("malformed notification payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A response had a different discriminator than the request implies.
    #[error("unexpected notification type: expected {expected}, got {got}")]
    UnexpectedType {
        expected: NotificationType,
        got: NotificationType,
    },

    /// `subscriptionRef` is empty.
    #[error("missing subscription reference")]
    MissingSubscriptionRef,

    /// Handshakes, heartbeats and status responses never list events.
    #[error("{0} notification must not carry events")]
    UnexpectedEvents(NotificationType),

    /// An event notification that lists nothing.
    #[error("event notification carries no events")]
    NoEvents,

    /// Listed event numbers are not strictly ascending.
    #[error("event numbers are not strictly ascending at {0}")]
    Unordered(EventNumber),

    /// The reported counter leaves no room for a following event.
    #[error("reported position {0} is out of range")]
    PositionOutOfRange(EventNumber),

    /// An event is numbered above the sender's own counter.
    #[error("event {event} is ahead of reported position {reported}")]
    EventAheadOfPosition {
        event: EventNumber,
        reported: EventNumber,
    },
}

/// Envelope type discriminator (`type` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationType {
    Handshake,
    Heartbeat,
    EventNotification,
    QueryStatus,
    QueryEvent,
}

impl NotificationType {
    /// Whether envelopes of this type may list events.
    pub fn carries_events(self) -> bool {
        matches!(
            self,
            NotificationType::EventNotification | NotificationType::QueryEvent
        )
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationType::Handshake => "handshake",
            NotificationType::Heartbeat => "heartbeat",
            NotificationType::EventNotification => "event-notification",
            NotificationType::QueryStatus => "query-status",
            NotificationType::QueryEvent => "query-event",
        };
        f.write_str(s)
    }
}

/// The resource a notified event points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Focus {
    pub reference: String,
}

/// One entry of `notificationEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub event_number: EventNumber,
    pub focus: Focus,
}

impl From<&EventRecord> for NotificationEvent {
    fn from(record: &EventRecord) -> Self {
        NotificationEvent {
            event_number: record.number,
            focus: Focus {
                reference: record.reference.clone(),
            },
        }
    }
}

impl From<NotificationEvent> for EventRecord {
    fn from(event: NotificationEvent) -> Self {
        EventRecord {
            number: event.event_number,
            reference: event.focus.reference,
        }
    }
}

/// Wire-level notification. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEnvelope {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub status: SubscriptionStatus,
    /// The sender's event counter at send time.
    pub events_since_subscription_start: EventNumber,
    pub subscription_ref: String,
    pub topic_ref: String,
    #[serde(default)]
    pub notification_event: Vec<NotificationEvent>,
}

impl NotificationEnvelope {
    /// Builds an envelope without events (handshake, heartbeat, query-status).
    pub fn bare(
        kind: NotificationType,
        status: SubscriptionStatus,
        position: EventNumber,
        subscription_ref: impl Into<String>,
        topic_ref: impl Into<String>,
    ) -> Self {
        NotificationEnvelope {
            kind,
            status,
            events_since_subscription_start: position,
            subscription_ref: subscription_ref.into(),
            topic_ref: topic_ref.into(),
            notification_event: Vec::new(),
        }
    }

    /// Attaches events, in the given order.
    pub fn with_events<'a>(mut self, events: impl IntoIterator<Item = &'a EventRecord>) -> Self {
        self.notification_event = events.into_iter().map(NotificationEvent::from).collect();
        self
    }

    /// Parses and validates an envelope from raw JSON.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: NotificationEnvelope = serde_json::from_slice(bytes)?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// The sender's reported position.
    pub fn position(&self) -> EventNumber {
        self.events_since_subscription_start
    }

    /// Returns the listed events as records, in wire order.
    pub fn events(&self) -> Vec<EventRecord> {
        self.notification_event
            .iter()
            .cloned()
            .map(EventRecord::from)
            .collect()
    }

    /// Returns the reference of the event numbered `number`, if listed.
    pub fn event(&self, number: EventNumber) -> Option<&str> {
        self.notification_event
            .iter()
            .find(|e| e.event_number == number)
            .map(|e| e.focus.reference.as_str())
    }

    /// Checks that the envelope has the expected discriminator.
    pub fn expect_kind(&self, expected: NotificationType) -> Result<(), ProtocolError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedType {
                expected,
                got: self.kind,
            })
        }
    }

    /// Checks the structural rules of the protocol.
    ///
    /// - `subscriptionRef` is non-empty
    /// - `eventsSinceSubscriptionStart` is below [`EventNumber::MAX`]
    /// - only `event-notification` and `query-event` list events
    /// - an `event-notification` lists at least one event
    /// - event numbers are strictly ascending
    /// - no event is numbered above `eventsSinceSubscriptionStart`
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.subscription_ref.trim().is_empty() {
            return Err(ProtocolError::MissingSubscriptionRef);
        }

        if self.events_since_subscription_start == EventNumber::MAX {
            return Err(ProtocolError::PositionOutOfRange(EventNumber::MAX));
        }

        if !self.kind.carries_events() && !self.notification_event.is_empty() {
            return Err(ProtocolError::UnexpectedEvents(self.kind));
        }

        if self.kind == NotificationType::EventNotification && self.notification_event.is_empty() {
            return Err(ProtocolError::NoEvents);
        }

        let mut previous: Option<EventNumber> = None;
        for event in &self.notification_event {
            if let Some(prev) = previous
                && event.event_number <= prev
            {
                return Err(ProtocolError::Unordered(event.event_number));
            }
            if event.event_number > self.events_since_subscription_start {
                return Err(ProtocolError::EventAheadOfPosition {
                    event: event.event_number,
                    reported: self.events_since_subscription_start,
                });
            }
            previous = Some(event.event_number);
        }

        Ok(())
    }
}

/// Closed range of event numbers, `[since, until]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRange {
    #[serde(rename = "eventsSinceNumber")]
    pub since: EventNumber,
    #[serde(rename = "eventsUntilNumber")]
    pub until: EventNumber,
}

impl EventRange {
    pub fn new(since: impl Into<EventNumber>, until: impl Into<EventNumber>) -> Self {
        EventRange {
            since: since.into(),
            until: until.into(),
        }
    }

    pub fn contains(&self, number: EventNumber) -> bool {
        self.since <= number && number <= self.until
    }

    /// Number of event numbers covered. Zero when `until < since`.
    pub fn len(&self) -> u64 {
        if self.until < self.since {
            0
        } else {
            (self.until.0 - self.since.0).saturating_add(1)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for EventRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.since, self.until)
    }
}
