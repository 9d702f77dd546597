use anyhow::Result;
use async_trait::async_trait;

use super::Publisher;

/// Logs messages instead of delivering them.
///
/// Nothing consumes these, so deletions requested through a service
/// configured with this publisher never happen.
pub struct LoggingPublisher {
    project: String,
}

impl LoggingPublisher {
    pub fn new(project: String) -> Self {
        Self { project }
    }
}

#[async_trait]
impl Publisher for LoggingPublisher {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<String> {
        let id = crate::utils::new_object_id();
        info!(
            "Dropping message {} for projects/{}/topics/{}: {}",
            id,
            self.project,
            topic,
            String::from_utf8_lossy(&data),
        );
        Ok(id)
    }
}
