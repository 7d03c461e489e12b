//! Newtype wrappers for protocol identifiers.
//!
//! These keep subscription ids, topic ids and event numbers from being mixed
//! up with each other or with plain integers and strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Locally assigned identifier of a subscription.
///
/// On the publisher this is the id handed back to the subscriber (and sent as
/// `subscriptionRef`). On the consumer it identifies the local mirror record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SubscriptionId {
    fn from(n: u64) -> Self {
        SubscriptionId(n)
    }
}

impl FromStr for SubscriptionId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(SubscriptionId)
    }
}

/// Identifier of a topic on the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(pub String);

impl TopicId {
    pub fn new(s: impl Into<String>) -> Self {
        TopicId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TopicId {
    fn from(s: &str) -> Self {
        TopicId(s.to_string())
    }
}

/// Position in a subscription's event sequence.
///
/// Event numbers start at 1; a counter value of 0 means nothing has been
/// notified (publisher) or processed (consumer) yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventNumber(pub u64);

impl EventNumber {
    pub const ZERO: EventNumber = EventNumber(0);

    /// Highest representable number. Envelopes may not report it, since
    /// nothing could follow it.
    pub const MAX: EventNumber = EventNumber(u64::MAX);

    /// Returns the number that follows this one, saturating at [`MAX`].
    ///
    /// [`MAX`]: EventNumber::MAX
    pub fn next(self) -> EventNumber {
        EventNumber(self.0.saturating_add(1))
    }

    /// Returns the number that follows this one, or `None` at [`MAX`].
    ///
    /// [`MAX`]: EventNumber::MAX
    pub fn checked_next(self) -> Option<EventNumber> {
        self.0.checked_add(1).map(EventNumber)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EventNumber {
    fn from(n: u64) -> Self {
        EventNumber(n)
    }
}

/// Key under which periodic work is registered with the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKey {
    /// Recurring heartbeat of one publisher-side subscription.
    Heartbeat(SubscriptionId),
    /// The global liveness sweep on the consumer side.
    Watchdog,
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::Heartbeat(id) => write!(f, "heartbeat:{}", id),
            TaskKey::Watchdog => write!(f, "watchdog"),
        }
    }
}
