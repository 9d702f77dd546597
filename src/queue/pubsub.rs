use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Publisher;

/// Where the service account token for the metadata server auth mode comes from.
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PubSubAuth {
    /// Fetch an access token from the GCE metadata server for every publish.
    Metadata,

    /// Send no credentials, for use with the Pub/Sub emulator.
    #[serde(rename = "none")]
    Anonymous,

    /// A fixed bearer token.
    Token(String),
}

impl Default for PubSubAuth {
    fn default() -> Self {
        Self::Metadata
    }
}

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Serialize)]
struct PublishRequest {
    messages: [PubSubMessage; 1],
}

#[derive(Serialize)]
struct PubSubMessage {
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Publishes messages to Google Cloud Pub/Sub topics within a project.
pub struct PubSubPublisher {
    http: Client,
    endpoint: String,
    project: String,
    auth: PubSubAuth,
}

impl PubSubPublisher {
    pub fn new(http: Client, endpoint: String, project: String, auth: PubSubAuth) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project,
            auth,
        }
    }

    #[inline]
    pub fn topic_path(&self, topic: &str) -> String {
        format!("projects/{}/topics/{}", self.project, topic)
    }

    async fn bearer_token(&self) -> Result<Option<String>> {
        match &self.auth {
            PubSubAuth::Anonymous => Ok(None),
            PubSubAuth::Token(token) => Ok(Some(token.clone())),
            PubSubAuth::Metadata => {
                let token: AccessToken = self
                    .http
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;

                Ok(Some(token.access_token))
            },
        }
    }
}

#[async_trait]
impl Publisher for PubSubPublisher {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<String> {
        let topic_path = self.topic_path(topic);
        let url = format!("{}/v1/{}:publish", self.endpoint, topic_path);
        let body = PublishRequest {
            messages: [PubSubMessage {
                data: base64::encode(&data),
            }],
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(token) = self.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Broker rejected publish to {} with status {}: {}",
                topic_path,
                status,
                detail
            ));
        }

        let published: PublishResponse = response.json().await?;
        published
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Broker accepted publish to {} but returned no message id", topic_path))
    }
}
