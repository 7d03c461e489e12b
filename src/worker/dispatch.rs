//! Routing of inbound envelopes to per-subscription workers.
//!
//! ```text
//!                                   ┌── subscription 1 queue ──► worker 1 ─┐
//! POST /notifications ──► dispatch ─┤                                      ├─► reconciler
//!        │                          └── subscription 2 queue ──► worker 2 ─┘
//!        │ 202 Accepted
//!        ▼
//! ```
//!
//! Workers are spawned lazily on the first envelope for a subscription and
//! live until the subscription is untracked or the relay shuts down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::message::WorkerMessage;
use super::worker::SubscriptionWorker;
use crate::consumer::NotificationReconciler;
use crate::notification::NotificationEnvelope;
use crate::types::SubscriptionId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("worker for subscription {0} is gone")]
    ChannelClosed(SubscriptionId),

    /// No worker is started for a subscription the reconciler does not track.
    #[error("subscription not tracked: {0}")]
    Untracked(SubscriptionId),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Channel buffer size for worker messages.
const WORKER_CHANNEL_BUFFER: usize = 100;

struct WorkerHandle {
    tx: mpsc::Sender<WorkerMessage>,
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Hands inbound work to per-subscription workers.
pub struct InboundDispatcher {
    reconciler: Arc<NotificationReconciler>,

    workers: RwLock<HashMap<SubscriptionId, WorkerHandle>>,

    /// Parent of every worker's token.
    shutdown: CancellationToken,
}

impl InboundDispatcher {
    pub fn new(reconciler: Arc<NotificationReconciler>) -> Self {
        Self::with_shutdown(reconciler, CancellationToken::new())
    }

    pub fn with_shutdown(reconciler: Arc<NotificationReconciler>, shutdown: CancellationToken) -> Self {
        InboundDispatcher {
            reconciler,
            workers: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    pub fn reconciler(&self) -> &Arc<NotificationReconciler> {
        &self.reconciler
    }

    /// Queues `envelope` for subscription `id`.
    ///
    /// Returns once the envelope is queued, not once it is reconciled.
    #[instrument(skip(self, envelope), fields(subscription_id = %id, kind = %envelope.kind))]
    pub async fn dispatch(&self, id: SubscriptionId, envelope: NotificationEnvelope) -> Result<()> {
        self.send(id, WorkerMessage::Notification(envelope)).await
    }

    /// Queues a forced resync for subscription `id`.
    pub async fn request_resync(&self, id: SubscriptionId) -> Result<()> {
        self.send(id, WorkerMessage::Resync).await
    }

    async fn send(&self, id: SubscriptionId, msg: WorkerMessage) -> Result<()> {
        let tx = self.get_or_spawn_worker(id).await?;
        tx.send(msg).await.map_err(|_| DispatchError::ChannelClosed(id))
    }

    /// Returns the sender for `id`'s worker, spawning one if needed.
    ///
    /// The tracking check runs under the write lock, so a worker spawned just
    /// before an untrack is still visible to the `remove_worker` that follows.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Untracked`] if there is no worker and the reconciler
    /// does not track `id`.
    async fn get_or_spawn_worker(&self, id: SubscriptionId) -> Result<mpsc::Sender<WorkerMessage>> {
        {
            let workers = self.workers.read().await;
            if let Some(handle) = workers.get(&id) {
                return Ok(handle.tx.clone());
            }
        }

        let mut workers = self.workers.write().await;

        // Double-check after acquiring write lock
        if let Some(handle) = workers.get(&id) {
            return Ok(handle.tx.clone());
        }

        if self.reconciler.mirror(id).is_none() {
            debug!(subscription_id = %id, "not spawning worker for untracked subscription");
            return Err(DispatchError::Untracked(id));
        }

        debug!(subscription_id = %id, "spawning worker");
        let (tx, rx) = mpsc::channel(WORKER_CHANNEL_BUFFER);
        let cancel = self.shutdown.child_token();

        let worker = SubscriptionWorker::new(id, Arc::clone(&self.reconciler));
        let task = tokio::spawn(worker.run(rx, cancel.clone()));

        workers.insert(
            id,
            WorkerHandle {
                tx: tx.clone(),
                task,
                cancel,
            },
        );
        Ok(tx)
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn has_worker(&self, id: SubscriptionId) -> bool {
        self.workers.read().await.contains_key(&id)
    }

    /// Stops and forgets the worker for `id`. Returns whether one existed.
    ///
    /// A pass already running completes; queued messages are dropped.
    pub async fn remove_worker(&self, id: SubscriptionId) -> bool {
        let mut workers = self.workers.write().await;
        match workers.remove(&id) {
            Some(handle) => {
                handle.cancel.cancel();
                let _ = handle.tx.try_send(WorkerMessage::Shutdown);
                debug!(subscription_id = %id, "worker removed");
                true
            }
            None => false,
        }
    }

    /// Stops all workers.
    ///
    /// Each worker first finishes what was queued before the call. Workers
    /// still busy after `grace` are cancelled.
    pub async fn shutdown_all(&self, grace: Duration) {
        let handles: Vec<(SubscriptionId, WorkerHandle)> = self.workers.write().await.drain().collect();
        info!(workers = handles.len(), "shutting down inbound workers");

        for (id, handle) in &handles {
            trace!(subscription_id = %id, "sending shutdown to worker");
            let _ = handle.tx.send(WorkerMessage::Shutdown).await;
        }

        let drain = async {
            for (_, handle) in handles {
                let _ = handle.task.await;
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(?grace, "workers did not drain in time, cancelling");
        }
        self.shutdown.cancel();
    }
}
