//! Messages accepted by a per-subscription inbound worker.

use crate::notification::NotificationEnvelope;

/// Work for one subscription's worker.
///
/// Messages are processed strictly in arrival order, one at a time, which is
/// what serializes reconciliation per subscription.
#[derive(Debug)]
pub enum WorkerMessage {
    /// An inbound envelope to reconcile. Already shape-validated.
    Notification(NotificationEnvelope),

    /// Query the source's status and reconcile against it.
    Resync,

    /// Finish the messages queued ahead of this one, then exit.
    Shutdown,
}
