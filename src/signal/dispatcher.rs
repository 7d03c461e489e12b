//! Best-effort fan-out of resolved resource references.

use std::collections::HashSet;

use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use super::registry::DestinationRegistry;
use crate::types::{EventNumber, SubscriptionId, TopicDescriptor};

/// Outcome of one dispatch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Forwards each reference to every destination bound to its topic.
///
/// Destinations are invoked concurrently and independently. A failing
/// destination is logged and counted, never raised.
pub struct SignalDispatcher {
    registry: DestinationRegistry,
}

impl SignalDispatcher {
    pub fn new(registry: DestinationRegistry) -> Self {
        SignalDispatcher { registry }
    }

    pub fn registry(&self) -> &DestinationRegistry {
        &self.registry
    }

    /// Delivers `reference` for event `event` of `subscription`.
    ///
    /// A destination bound more than once to the topic is invoked once.
    #[instrument(skip(self, topic), fields(topic = %topic))]
    pub async fn dispatch(
        &self,
        subscription: SubscriptionId,
        topic: &TopicDescriptor,
        event: EventNumber,
        reference: &str,
    ) -> DispatchReport {
        let mut seen = HashSet::new();
        let mut deliveries = JoinSet::new();

        for binding in self.registry.destinations_for(topic) {
            let id = binding.destination.id();
            if !seen.insert(id.clone()) {
                debug!(destination = %id, "skipping duplicate binding");
                continue;
            }

            let destination = binding.destination.clone();
            let signal = binding.signal_for(topic);
            let payload = reference.to_string();
            deliveries.spawn(async move {
                let ok = destination.deliver(&signal, &payload).await;
                (id, ok)
            });
        }

        let mut report = DispatchReport::default();
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((_, true)) => report.delivered += 1,
                Ok((id, false)) => {
                    warn!(destination = %id, "signal delivery failed");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "signal delivery panicked");
                    report.failed += 1;
                }
            }
        }

        if report.attempted() == 0 {
            debug!("no destinations bound");
        } else {
            debug!(delivered = report.delivered, failed = report.failed, "dispatched");
        }
        report
    }
}
