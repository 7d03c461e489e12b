//! Per-subscription inbound workers.
//!
//! The notification endpoint acknowledges immediately and hands envelopes to
//! a worker dedicated to the target subscription. Each worker reconciles its
//! envelopes one at a time in arrival order; different subscriptions are
//! reconciled concurrently. Dropping the HTTP request never cancels work that
//! has been handed off.
//!
//! - [`message`]: what a worker accepts
//! - [`worker`]: the worker event loop
//! - [`dispatch`]: routing envelopes to workers, spawning them on demand

pub mod dispatch;
pub mod message;
pub mod worker;

pub use dispatch::{DispatchError, InboundDispatcher};
pub use message::WorkerMessage;
pub use worker::SubscriptionWorker;
