//! Subscription Relay - a reliability layer for resource-change notifications.
//!
//! Webhook delivery is lossy. This library implements both ends of a numbered
//! notification protocol so that missed notifications are detected and
//! recovered by replaying a closed range of event numbers:
//!
//! - [`publisher`]: assigns event numbers, sends handshakes, heartbeats and
//!   event notifications to callback addresses, answers status/range queries.
//! - [`consumer`]: reconciles inbound notifications against the locally
//!   recorded position, recovers gaps, and runs the liveness watchdog.
//! - [`signal`]: fans resolved resource references out to downstream consumers.
//! - [`scheduler`]: keyed periodic tasks with cancel-and-replace semantics.

pub mod config;
pub mod consumer;
pub mod locks;
pub mod notification;
pub mod persistence;
pub mod publisher;
pub mod scheduler;
pub mod server;
pub mod signal;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_utils;
