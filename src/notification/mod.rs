//! Notification wire protocol.
//!
//! Both the publisher and the consumer speak the same JSON envelope; the
//! publisher builds envelopes, the consumer parses and validates them.

mod envelope;

pub use envelope::{
    EventRange, Focus, NotificationEnvelope, NotificationEvent, NotificationType, ProtocolError,
};
