//! Downstream destinations.
//!
//! A destination takes a signal name and a payload (the resource reference)
//! and reports success as a plain boolean. Failures are logged here; callers
//! never see more than the boolean.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

/// A downstream consumer of resolved resource references.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Identity used to de-duplicate destinations bound more than once.
    fn id(&self) -> String;

    async fn deliver(&self, signal_name: &str, payload: &str) -> bool;
}

/// Raises a named signal on a BPMN process engine.
///
/// POSTs `{url}/signal` with
/// `{"name": <signal>, "variables": {"resourceReference": {"value": <payload>, "type": "String"}}}`.
pub struct ProcessEngineDestination {
    url: String,
    client: reqwest::Client,
}

impl ProcessEngineDestination {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        ProcessEngineDestination {
            url: url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl Destination for ProcessEngineDestination {
    fn id(&self) -> String {
        format!("process-engine:{}", self.url)
    }

    async fn deliver(&self, signal_name: &str, payload: &str) -> bool {
        let body = json!({
            "name": signal_name,
            "variables": {
                "resourceReference": { "value": payload, "type": "String" }
            }
        });
        post_json(&self.client, &format!("{}/signal", self.url), &body, &self.id()).await
    }
}

/// Publishes a record to an event-stream topic through a REST proxy.
///
/// POSTs `{url}/topics/{topic}` with `{"records": [{"key": <signal>, "value": <payload>}]}`.
pub struct TopicPublishDestination {
    url: String,
    topic: String,
    client: reqwest::Client,
}

impl TopicPublishDestination {
    pub fn new(url: impl Into<String>, topic: impl Into<String>, client: reqwest::Client) -> Self {
        TopicPublishDestination {
            url: url.into().trim_end_matches('/').to_string(),
            topic: topic.into(),
            client,
        }
    }
}

#[async_trait]
impl Destination for TopicPublishDestination {
    fn id(&self) -> String {
        format!("topic:{}/{}", self.url, self.topic)
    }

    async fn deliver(&self, signal_name: &str, payload: &str) -> bool {
        let body = json!({
            "records": [ { "key": signal_name, "value": payload } ]
        });
        let url = format!("{}/topics/{}", self.url, self.topic);
        post_json(&self.client, &url, &body, &self.id()).await
    }
}

async fn post_json(client: &reqwest::Client, url: &str, body: &serde_json::Value, destination: &str) -> bool {
    match client.post(url).json(body).send().await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            warn!(destination, status = response.status().as_u16(), "destination rejected signal");
            false
        }
        Err(e) => {
            warn!(destination, error = %e, "destination unreachable");
            false
        }
    }
}

/// Shared HTTP client for destinations.
pub fn destination_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}
