//! Event loop of a single subscription's inbound worker.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::message::WorkerMessage;
use crate::consumer::{NotificationReconciler, ReconcileError, ReconcileOutcome};
use crate::types::SubscriptionId;

/// Reconciles envelopes for one subscription, in order.
pub struct SubscriptionWorker {
    id: SubscriptionId,
    reconciler: Arc<NotificationReconciler>,
}

impl SubscriptionWorker {
    pub fn new(id: SubscriptionId, reconciler: Arc<NotificationReconciler>) -> Self {
        SubscriptionWorker { id, reconciler }
    }

    /// Runs until a `Shutdown` message, channel close, or cancellation.
    ///
    /// Cancellation is only observed between messages; a reconciliation pass
    /// in progress always completes.
    #[instrument(skip(self, rx, shutdown), fields(subscription_id = %self.id))]
    pub async fn run(self, mut rx: mpsc::Receiver<WorkerMessage>, shutdown: CancellationToken) {
        debug!("worker started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("shutdown signal received, stopping worker");
                    break;
                }

                msg = rx.recv() => {
                    match msg {
                        Some(WorkerMessage::Shutdown) => {
                            debug!("shutdown message received");
                            break;
                        }
                        Some(msg) => self.handle_message(msg).await,
                        None => {
                            debug!("message channel closed");
                            break;
                        }
                    }
                }
            }
        }

        debug!("worker stopped");
    }

    async fn handle_message(&self, msg: WorkerMessage) {
        let result = match msg {
            WorkerMessage::Notification(envelope) => self.reconciler.reconcile(self.id, &envelope).await,
            WorkerMessage::Resync => self.reconciler.resync(self.id).await,
            WorkerMessage::Shutdown => return,
        };

        match result {
            Ok(ReconcileOutcome::Stale) => debug!("stale input absorbed"),
            Ok(outcome) => debug!(?outcome, "reconciled"),
            Err(ReconcileError::Unknown(_)) => {
                info!("subscription no longer tracked, dropping message");
            }
            Err(e @ (ReconcileError::Recovery { .. } | ReconcileError::StatusQuery(_))) => {
                warn!(error = %e, "reconciliation aborted, will retry on next notification");
            }
            Err(e) => error!(error = %e, "reconciliation failed"),
        }
    }
}
