//! Outbound callback sends.
//!
//! A send either succeeds (2xx) or fails with a transport-level reason. The
//! engine does not retry; the next scheduled heartbeat is the retry.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::notification::NotificationEnvelope;

/// Why a callback send did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallbackError {
    #[error("callback request timed out")]
    Timeout,

    #[error("callback request failed: {0}")]
    Network(String),

    #[error("callback returned HTTP {0}")]
    Status(u16),
}

/// Sends an envelope to a subscription's callback address.
#[async_trait]
pub trait CallbackClient: Send + Sync {
    async fn send(&self, callback: &str, envelope: &NotificationEnvelope) -> Result<(), CallbackError>;
}

/// `reqwest`-backed callback client. POSTs the envelope as JSON.
#[derive(Clone)]
pub struct HttpCallbackClient {
    client: reqwest::Client,
}

impl HttpCallbackClient {
    /// Creates a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpCallbackClient { client })
    }

    /// Wraps an existing `reqwest` client.
    pub fn from_client(client: reqwest::Client) -> Self {
        HttpCallbackClient { client }
    }
}

#[async_trait]
impl CallbackClient for HttpCallbackClient {
    async fn send(&self, callback: &str, envelope: &NotificationEnvelope) -> Result<(), CallbackError> {
        let response = self
            .client
            .post(callback)
            .json(envelope)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(CallbackError::Status(status.as_u16()))
        }
    }
}

fn classify(err: reqwest::Error) -> CallbackError {
    if err.is_timeout() {
        CallbackError::Timeout
    } else {
        CallbackError::Network(err.to_string())
    }
}
