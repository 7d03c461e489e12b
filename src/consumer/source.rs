//! Queries against the source server: status and range recovery.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::notification::{EventRange, NotificationEnvelope, NotificationType, ProtocolError};
use crate::types::{EventNumber, SubscriptionData};

/// Why a query against the source failed.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source request timed out")]
    Timeout,

    #[error("source request failed: {0}")]
    Network(String),

    #[error("source returned HTTP {0}")]
    Status(u16),

    #[error("invalid source response: {0}")]
    Protocol(#[from] ProtocolError),

    /// A range reply that stops short of the requested range.
    #[error("source has no event {missing} in {range}")]
    IncompleteRange { range: EventRange, missing: EventNumber },
}

impl SourceError {
    /// Transport failures, as opposed to protocol-shape failures.
    pub fn is_transport(&self) -> bool {
        !matches!(
            self,
            SourceError::Protocol(_) | SourceError::IncompleteRange { .. }
        )
    }
}

/// Read-only queries a consumer issues against the source of a subscription.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Returns a `query-status` envelope with the source's current counter.
    async fn query_status(&self, subscription: &SubscriptionData) -> Result<NotificationEnvelope, SourceError>;

    /// Returns a `query-event` envelope listing the events in `range`.
    async fn query_events(
        &self,
        subscription: &SubscriptionData,
        range: EventRange,
    ) -> Result<NotificationEnvelope, SourceError>;
}

/// `reqwest`-backed source client.
///
/// Calls `GET {source}/api/v1/subscriptions/{remote_id}/status` and
/// `GET {source}/api/v1/subscriptions/{remote_id}/events?eventsSinceNumber=&eventsUntilNumber=`.
#[derive(Clone)]
pub struct HttpSourceClient {
    client: reqwest::Client,
}

impl HttpSourceClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpSourceClient { client })
    }

    fn url(subscription: &SubscriptionData, suffix: &str) -> String {
        format!(
            "{}/api/v1/subscriptions/{}/{}",
            subscription.source.trim_end_matches('/'),
            subscription.remote_id,
            suffix
        )
    }

    async fn fetch(
        &self,
        request: reqwest::RequestBuilder,
        expected: NotificationType,
    ) -> Result<NotificationEnvelope, SourceError> {
        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(classify)?;
        let envelope = NotificationEnvelope::from_slice(&body)?;
        envelope.expect_kind(expected)?;
        Ok(envelope)
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn query_status(&self, subscription: &SubscriptionData) -> Result<NotificationEnvelope, SourceError> {
        let request = self.client.get(Self::url(subscription, "status"));
        self.fetch(request, NotificationType::QueryStatus).await
    }

    async fn query_events(
        &self,
        subscription: &SubscriptionData,
        range: EventRange,
    ) -> Result<NotificationEnvelope, SourceError> {
        let request = self
            .client
            .get(Self::url(subscription, "events"))
            .query(&range);
        self.fetch(request, NotificationType::QueryEvent).await
    }
}

fn classify(err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Network(err.to_string())
    }
}
