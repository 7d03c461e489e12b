//! Keyed periodic task scheduler.
//!
//! Every piece of time-driven behaviour (handshakes, heartbeats, watchdog
//! sweeps) goes through a [`PeriodicTaskScheduler`]. Periodic tasks are
//! registered under a key; scheduling under a key that already has a task
//! cancels the old one first.
//!
//! # Execution model
//!
//! Each periodic task runs its own timer loop as a tokio task. On every tick
//! the action is spawned as a separate task and awaited, so:
//!
//! - a slow action only delays the next firing of its own key
//! - a panicking action is logged and the cadence continues
//! - cancellation stops future firings but never interrupts a running action
//!
//! # Registry
//!
//! The key → cancellation-handle map is the only structure here mutated by
//! concurrent callers. Replace and cancel both happen under its lock, so two
//! live periodic tasks for the same key can never coexist.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Smallest period accepted; shorter periods are clamped to it.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Owns all recurring and delayed work.
pub struct PeriodicTaskScheduler<K> {
    /// Cancellation handles of the tracked periodic tasks.
    tasks: Mutex<HashMap<K, CancellationToken>>,

    /// Parent of every task token; cancelled on shutdown.
    root: CancellationToken,
}

impl<K> PeriodicTaskScheduler<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    /// Creates a scheduler with its own shutdown token.
    pub fn new() -> Self {
        Self::with_shutdown(CancellationToken::new())
    }

    /// Creates a scheduler whose tasks all stop when `shutdown` is cancelled.
    pub fn with_shutdown(shutdown: CancellationToken) -> Self {
        PeriodicTaskScheduler {
            tasks: Mutex::new(HashMap::new()),
            root: shutdown,
        }
    }

    /// Starts a periodic task under `key`, replacing any existing one.
    ///
    /// The first firing happens after `initial_delay`, subsequent firings
    /// every `period`. A firing that overruns the period delays the next one
    /// rather than bunching up. Periods below one millisecond are clamped.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use subscription_relay::scheduler::PeriodicTaskScheduler;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let scheduler = PeriodicTaskScheduler::<&'static str>::new();
    /// scheduler.schedule("heartbeat", Duration::ZERO, Duration::from_secs(30), || async {});
    ///
    /// // Scheduling the same key again replaces the running task.
    /// scheduler.schedule("heartbeat", Duration::ZERO, Duration::from_secs(60), || async {});
    /// assert_eq!(scheduler.len(), 1);
    ///
    /// scheduler.shutdown();
    /// # }
    /// ```
    pub fn schedule<F, Fut>(&self, key: K, initial_delay: Duration, period: Duration, action: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = if period < MIN_PERIOD {
            warn!(task = %key, ?period, "period too short, clamping");
            MIN_PERIOD
        } else {
            period
        };
        let start = Instant::now() + initial_delay;

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());

        let cancel = self.root.child_token();
        if let Some(previous) = tasks.insert(key.clone(), cancel.clone()) {
            previous.cancel();
            debug!(task = %key, "replaced periodic task");
        } else {
            debug!(task = %key, ?initial_delay, ?period, "scheduled periodic task");
        }

        // Spawned while the registry lock is held so that a concurrent
        // `schedule` for the same key observes either none or all of this call.
        tokio::spawn(run_periodic(key, start, period, action, cancel));
    }

    /// Runs `action` once after `delay`. Not tracked under any key.
    ///
    /// Only scheduler shutdown prevents the firing.
    pub fn schedule_once<Fut>(&self, delay: Duration, action: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.root.child_token();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => action.await,
            }
        });
    }

    /// Cancels the task under `key`. Returns whether one was registered.
    pub fn cancel(&self, key: &K) -> bool {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        match tasks.remove(key) {
            Some(token) => {
                token.cancel();
                debug!(task = %key, "cancelled periodic task");
                true
            }
            None => false,
        }
    }

    /// Cancels every tracked periodic task.
    pub fn cancel_all(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let count = tasks.len();
        for (_, token) in tasks.drain() {
            token.cancel();
        }
        debug!(count, "cancelled all periodic tasks");
    }

    /// Cancels everything, including pending one-shot tasks.
    pub fn shutdown(&self) {
        self.cancel_all();
        self.root.cancel();
    }

    /// Whether a periodic task is registered under `key`.
    pub fn is_scheduled(&self, key: &K) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    /// Number of registered periodic tasks.
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Default for PeriodicTaskScheduler<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Timer loop of a single periodic task.
async fn run_periodic<K, F, Fut>(
    key: K,
    start: Instant,
    period: Duration,
    action: F,
    cancel: CancellationToken,
) where
    K: Display + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        trace!(task = %key, "firing");
        // Not raced against `cancel`: an in-flight firing runs to completion.
        if let Err(e) = tokio::spawn(action()).await {
            warn!(task = %key, error = %e, "scheduled action failed");
        }
    }

    trace!(task = %key, "periodic task stopped");
}
