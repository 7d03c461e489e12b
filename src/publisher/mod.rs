//! Source side of the notification protocol.
//!
//! - [`store`]: the subscription registry contract and its in-memory impl
//! - [`callback`]: outbound sends to subscriber callbacks
//! - [`engine`]: [`PublisherDeliveryEngine`], numbering, cadence and status

pub mod callback;
pub mod engine;
pub mod store;

pub use callback::{CallbackClient, CallbackError, HttpCallbackClient};
pub use engine::{PublisherDeliveryEngine, PublisherError};
pub use store::{InMemorySubscriptionStore, NewSubscription, StoreError, SubscriptionStore};
