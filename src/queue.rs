use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

mod logging;
mod pubsub;

pub use logging::LoggingPublisher;
pub use pubsub::{PubSubAuth, PubSubPublisher};

/// A sink for fire-and-forget messages.
///
/// A successful publish only means the broker accepted the message,
/// delivery to subscribers happens asynchronously and at least once.
#[async_trait]
pub trait Publisher: Sync + Send + 'static {
    /// Publishes `data` to `topic`, returning the broker's message id.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<String>;
}

/// A request for faceclaims to be removed by the deletion consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, IntoStaticStr)]
#[serde(untagged)]
pub enum DeletionMessage {
    /// Every faceclaim belonging to a character.
    #[strum(serialize = "delete-faceclaim-group")]
    Group { charid: String },

    /// A single faceclaim, addressed by its full key.
    #[strum(serialize = "delete-single-faceclaim")]
    Single { key: String },
}

impl DeletionMessage {
    #[inline]
    pub fn topic(&self) -> &'static str {
        self.into()
    }

    /// The UTF-8 JSON payload, e.g. `{"charid":"abc"}`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

pub async fn publish_message(publisher: &dyn Publisher, message: &DeletionMessage) -> Result<String> {
    let topic = message.topic();
    let data = message.encode()?;

    debug!("Publishing {} to {}", String::from_utf8_lossy(&data), topic);
    publisher.publish(topic, data).await
}

fn default_pubsub_endpoint() -> String {
    "https://pubsub.googleapis.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum QueueConfig {
    /// Google Cloud Pub/Sub through its REST API.
    PubSub {
        #[serde(default = "default_pubsub_endpoint")]
        endpoint: String,

        #[serde(default)]
        auth: PubSubAuth,
    },

    /// Messages are only logged, nothing is delivered.
    Log,
}

impl QueueConfig {
    pub fn connect(&self, project: &str, http: reqwest::Client) -> Arc<dyn Publisher> {
        match self {
            Self::PubSub { endpoint, auth } => Arc::new(PubSubPublisher::new(
                http,
                endpoint.clone(),
                project.to_string(),
                auth.clone(),
            )),
            Self::Log => Arc::new(LoggingPublisher::new(project.to_string())),
        }
    }
}
