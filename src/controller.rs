use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use poem_openapi::Object;

use crate::error::ApiError;
use crate::processor::{self, ImageKind};
use crate::queue::{publish_message, DeletionMessage, Publisher};
use crate::storage::{BlobStore, ObjectMetadata};

/// The quality faceclaims are re-encoded at.
pub const WEBP_QUALITY: f32 = 99.0;

/// A request to store a new faceclaim for a character.
#[derive(Object, Debug, Clone)]
pub struct FaceclaimRequest {
    /// The id of the uploading user.
    pub user: i64,

    /// The id of the guild the character belongs to.
    pub guild: i64,

    /// The character the faceclaim belongs to.
    ///
    /// This becomes the key prefix of the stored image.
    #[oai(validator(min_length = 1, pattern = r"^[^/]+$"))]
    pub charid: String,

    /// Where to fetch the source image from.
    #[oai(validator(min_length = 1))]
    pub image_url: String,
}

pub struct FaceclaimController {
    images: Arc<dyn BlobStore>,
    logs: Arc<dyn BlobStore>,
    publisher: Arc<dyn Publisher>,
    http: reqwest::Client,
    fetch_timeout: Option<Duration>,
}

impl FaceclaimController {
    pub fn new(
        images: Arc<dyn BlobStore>,
        logs: Arc<dyn BlobStore>,
        publisher: Arc<dyn Publisher>,
        http: reqwest::Client,
        fetch_timeout: Option<Duration>,
    ) -> Self {
        Self {
            images,
            logs,
            publisher,
            http,
            fetch_timeout,
        }
    }

    /// The public URL of an object in the faceclaim bucket.
    #[inline]
    pub fn object_url(&self, key: &str) -> String {
        format!("https://{}/{}", self.images.name(), key)
    }

    /// Fetches, converts and stores a faceclaim, returning its public URL.
    ///
    /// Every call stores under a freshly generated key, so retrying a
    /// failed upload never overwrites anything.
    pub async fn upload_faceclaim(&self, req: &FaceclaimRequest) -> Result<String, ApiError> {
        // Parsed once so the stored metadata holds the percent encoded form
        // and stays a valid header value.
        let source_url = reqwest::Url::parse(&req.image_url).map_err(ApiError::upstream)?;

        info!("Fetching {}", &source_url);
        let source = self.fetch_source(source_url.clone()).await?;

        let encoded = tokio::task::spawn_blocking(move || {
            let img = processor::decode(&source).map_err(ApiError::upstream)?;

            debug!("Converting to WebP");
            processor::encode(&img, ImageKind::Webp, WEBP_QUALITY).map_err(ApiError::backend)
        })
        .await
        .map_err(ApiError::backend)??;

        let key = faceclaim_key(&req.charid);
        let metadata = ObjectMetadata {
            uploader: req.user.to_string(),
            guild: req.guild.to_string(),
            original: source_url.into(),
        };

        info!("Uploading {} with metadata {:?}", &key, &metadata);
        self.images
            .write(&key, encoded, ImageKind::Webp.as_content_type(), Some(&metadata))
            .await
            .map_err(ApiError::backend)?;

        Ok(self.object_url(&key))
    }

    async fn fetch_source(&self, url: reqwest::Url) -> Result<Bytes, ApiError> {
        let mut request = self.http.get(url);
        if let Some(timeout) = self.fetch_timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(ApiError::upstream)?;

        response.bytes().await.map_err(ApiError::upstream)
    }

    /// Requests deletion of every faceclaim belonging to `charid`.
    pub async fn delete_all(&self, charid: &str) -> Result<(), ApiError> {
        info!("Deleting all of {}'s faceclaims", charid);

        let message = DeletionMessage::Group {
            charid: charid.to_string(),
        };
        self.publish(&message).await
    }

    /// Requests deletion of a single faceclaim.
    ///
    /// The key is not checked for existence.
    pub async fn delete_one(&self, charid: &str, image: &str) -> Result<(), ApiError> {
        let key = format!("{}/{}", charid, image);
        info!("Deleting {}", &key);

        self.publish(&DeletionMessage::Single { key }).await
    }

    async fn publish(&self, message: &DeletionMessage) -> Result<(), ApiError> {
        let id = publish_message(self.publisher.as_ref(), message)
            .await
            .map_err(ApiError::backend)?;

        debug!("Broker accepted message {} on {}", id, message.topic());
        Ok(())
    }

    /// Stores a log file under its own name, replacing any previous upload.
    pub async fn upload_log(&self, filename: &str, data: Bytes) -> Result<(), ApiError> {
        info!("Uploading {}", filename);

        self.logs
            .write(filename, data, mime::TEXT_PLAIN.as_ref(), None)
            .await
            .map_err(ApiError::backend)
    }
}

fn faceclaim_key(charid: &str) -> String {
    format!(
        "{}/{}.{}",
        charid,
        crate::utils::new_object_id(),
        ImageKind::Webp.as_file_extension()
    )
}
