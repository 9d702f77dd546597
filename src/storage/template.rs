use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// The metadata attached to a stored faceclaim.
///
/// The field set is closed, backends persist it as plain string pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// The id of the user who uploaded the image.
    pub uploader: String,

    /// The id of the guild the character belongs to.
    pub guild: String,

    /// The source URL the image was fetched from.
    pub original: String,
}

impl ObjectMetadata {
    pub fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            ("uploader", &self.uploader),
            ("guild", &self.guild),
            ("original", &self.original),
        ]
    }
}

/// A handle to a single named bucket.
///
/// Requests only ever write, the read and delete half serves the deletion
/// consumer sharing these buckets and the tests.
#[allow(dead_code)]
#[async_trait]
pub trait BlobStore: Sync + Send + 'static {
    /// The name of the bucket this handle points at.
    fn name(&self) -> &str;

    /// Writes a blob, silently replacing any existing blob with the same key.
    async fn write(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: Option<&ObjectMetadata>,
    ) -> anyhow::Result<()>;

    async fn exists(&self, key: &str) -> anyhow::Result<bool>;

    async fn fetch(&self, key: &str) -> anyhow::Result<Option<Bytes>>;

    /// Removes a blob.
    ///
    /// Removing a key which does not exist is not an error.
    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Lists every key starting with `prefix`.
    ///
    /// The stream is finite and cannot be restarted once polled.
    fn list(&self, prefix: &str) -> BoxStream<'_, anyhow::Result<String>>;
}
