use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::BlobStore;

fn default_gcs_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_region() -> String {
    "auto".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum StorageConfig {
    /// Google Cloud Storage through its S3 compatible API.
    Gcs {
        #[serde(default = "default_gcs_endpoint")]
        endpoint: String,

        #[serde(default = "default_region")]
        region: String,

        /// The HMAC access key.
        ///
        /// Falls back to the standard credential environment when missing.
        #[serde(default)]
        access_key: Option<String>,

        #[serde(default)]
        secret_key: Option<String>,

        #[serde(default)]
        request_timeout_secs: Option<u64>,
    },

    /// Buckets are directories under `directory`.
    FileSystem {
        directory: PathBuf,
    },
}

impl StorageConfig {
    /// Opens a handle to the named bucket.
    ///
    /// Fails if the bucket does not exist or the credentials are rejected.
    pub async fn open_bucket(&self, name: &str) -> anyhow::Result<Arc<dyn BlobStore>> {
        debug!("Getting bucket {}", name);

        match self {
            Self::Gcs {
                endpoint,
                region,
                access_key,
                secret_key,
                request_timeout_secs,
            } => {
                let backend = super::blob_storage::BlobStorageBackend::open(
                    name,
                    region.clone(),
                    endpoint.clone(),
                    access_key.as_deref(),
                    secret_key.as_deref(),
                    request_timeout_secs.map(Duration::from_secs),
                )
                .await?;
                Ok(Arc::new(backend))
            },
            Self::FileSystem { directory } => {
                let backend = super::filesystem::FileSystemBackend::open(directory, name).await?;
                Ok(Arc::new(backend))
            },
        }
    }
}
