//! Consumer side of the notification protocol.
//!
//! - [`store`]: mirrors of remote subscriptions, in memory or on disk
//! - [`source`]: status and range queries against the source
//! - [`reconciler`]: [`NotificationReconciler`], gap detection and recovery
//! - [`watchdog`]: [`LivenessWatchdog`], forced resync of quiet subscriptions

pub mod reconciler;
pub mod source;
pub mod store;
pub mod watchdog;

pub use reconciler::{NotificationReconciler, ReconcileError, ReconcileOutcome};
pub use source::{HttpSourceClient, SourceClient, SourceError};
pub use store::{DataStoreError, InMemoryDataStore, JsonFileDataStore, SubscriptionDataStore};
pub use watchdog::{LivenessWatchdog, SweepReport};
