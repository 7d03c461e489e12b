//! Which destinations are bound to which topic.
//!
//! Bindings can be built in code or loaded from a JSON file:
//!
//! ```json
//! {
//!   "bindings": [
//!     {
//!       "resourceType": "Patient",
//!       "operation": "create",
//!       "destinations": [
//!         { "kind": "process_engine", "url": "http://engine/engine-rest", "signalName": "new-patient" },
//!         { "kind": "topic_publish", "url": "http://proxy", "topic": "patients" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::destination::{Destination, ProcessEngineDestination, TopicPublishDestination};
use crate::types::TopicDescriptor;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read destinations file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid destinations file: {0}")]
    Json(#[from] serde_json::Error),
}

/// One destination bound to a topic, with an optional signal name override.
#[derive(Clone)]
pub struct Binding {
    pub destination: Arc<dyn Destination>,
    pub signal_name: Option<String>,
}

impl Binding {
    /// Signal name to use for `topic`: the override, else `{resourceType}-{operation}`.
    pub fn signal_for(&self, topic: &TopicDescriptor) -> String {
        self.signal_name
            .clone()
            .unwrap_or_else(|| topic.signal_name())
    }
}

/// Destination definition as written in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DestinationConfig {
    ProcessEngine {
        url: String,
        #[serde(default, rename = "signalName")]
        signal_name: Option<String>,
    },
    TopicPublish {
        url: String,
        topic: String,
        #[serde(default, rename = "signalName")]
        signal_name: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingConfig {
    #[serde(flatten)]
    pub topic: TopicDescriptor,
    pub destinations: Vec<DestinationConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
}

/// Topic → bound destinations.
#[derive(Clone, Default)]
pub struct DestinationRegistry {
    bindings: HashMap<TopicDescriptor, Vec<Binding>>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `destination` to `topic`.
    pub fn bind(&mut self, topic: TopicDescriptor, destination: Arc<dyn Destination>, signal_name: Option<String>) {
        self.bindings.entry(topic).or_default().push(Binding {
            destination,
            signal_name,
        });
    }

    /// Destinations bound to `topic`, in binding order. Empty if none.
    pub fn destinations_for(&self, topic: &TopicDescriptor) -> &[Binding] {
        self.bindings.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of bindings across all topics.
    pub fn len(&self) -> usize {
        self.bindings.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds HTTP destinations from parsed configuration.
    pub fn from_config(config: RegistryConfig, client: reqwest::Client) -> Self {
        let mut registry = DestinationRegistry::new();
        for binding in config.bindings {
            for destination in binding.destinations {
                let (dest, signal_name): (Arc<dyn Destination>, Option<String>) = match destination {
                    DestinationConfig::ProcessEngine { url, signal_name } => {
                        (Arc::new(ProcessEngineDestination::new(url, client.clone())), signal_name)
                    }
                    DestinationConfig::TopicPublish {
                        url,
                        topic,
                        signal_name,
                    } => (
                        Arc::new(TopicPublishDestination::new(url, topic, client.clone())),
                        signal_name,
                    ),
                };
                registry.bind(binding.topic.clone(), dest, signal_name);
            }
        }
        registry
    }

    /// Loads bindings from a JSON file.
    pub fn load(path: &Path, client: reqwest::Client) -> Result<Self, RegistryError> {
        let bytes = std::fs::read(path)?;
        let config: RegistryConfig = serde_json::from_slice(&bytes)?;
        let registry = Self::from_config(config, client);
        info!(path = %path.display(), bindings = registry.len(), "loaded destinations");
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingDestination;
    use crate::types::TriggerOperation;
    use std::time::Duration;

    fn patient_create() -> TopicDescriptor {
        TopicDescriptor::new("Patient", TriggerOperation::Create)
    }

    fn client() -> reqwest::Client {
        super::super::destination::destination_client(Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn unbound_topic_has_no_destinations() {
        let registry = DestinationRegistry::new();
        assert!(registry.destinations_for(&patient_create()).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn signal_name_defaults_and_overrides() {
        let mut registry = DestinationRegistry::new();
        registry.bind(patient_create(), Arc::new(RecordingDestination::new("a")), None);
        registry.bind(
            patient_create(),
            Arc::new(RecordingDestination::new("b")),
            Some("new-patient".to_string()),
        );

        let bindings = registry.destinations_for(&patient_create());
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].signal_for(&patient_create()), "Patient-create");
        assert_eq!(bindings[1].signal_for(&patient_create()), "new-patient");
    }

    #[test]
    fn parses_file_format() {
        let json = r#"{
            "bindings": [{
                "resourceType": "Patient",
                "operation": "create",
                "destinations": [
                    { "kind": "process_engine", "url": "http://engine", "signalName": "new-patient" },
                    { "kind": "topic_publish", "url": "http://proxy", "topic": "patients" }
                ]
            }]
        }"#;
        let config: RegistryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.bindings[0].topic, patient_create());
        assert_eq!(
            config.bindings[0].destinations[1],
            DestinationConfig::TopicPublish {
                url: "http://proxy".to_string(),
                topic: "patients".to_string(),
                signal_name: None
            }
        );

        let registry = DestinationRegistry::from_config(config, client());
        let bindings = registry.destinations_for(&patient_create());
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].destination.id(), "process-engine:http://engine");
        assert_eq!(bindings[0].signal_for(&patient_create()), "new-patient");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = DestinationRegistry::load(&dir.path().join("absent.json"), client());
        assert!(matches!(result, Err(RegistryError::Io(_))));
    }
}
