use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::queue::{PubSubAuth, QueueConfig};
use crate::storage::StorageConfig;

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => Self::OFF,
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

/// The storage backend a generated config template targets.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum TemplateBackend {
    Gcs,
    Filesystem,
}

/// Selects the storage and queue transports.
///
/// Secrets and bucket names are not part of this file, they come
/// from the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Where faceclaims and logs are stored.
    pub storage: StorageConfig,

    /// Where deletion requests are published.
    pub queue: QueueConfig,
}

impl RuntimeConfig {
    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn template(backend: TemplateBackend) -> Self {
        match backend {
            TemplateBackend::Gcs => Self {
                storage: StorageConfig::Gcs {
                    endpoint: "https://storage.googleapis.com".into(),
                    region: "auto".into(),
                    access_key: None,
                    secret_key: None,
                    request_timeout_secs: Some(30),
                },
                queue: QueueConfig::PubSub {
                    endpoint: "https://pubsub.googleapis.com".into(),
                    auth: PubSubAuth::Metadata,
                },
            },
            TemplateBackend::Filesystem => Self {
                storage: StorageConfig::FileSystem {
                    directory: PathBuf::from("./data"),
                },
                queue: QueueConfig::Log,
            },
        }
    }
}
