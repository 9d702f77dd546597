use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use s3::creds::Credentials;
use s3::{Bucket, Region};

use crate::storage::{keys_stream, BlobStore, ObjectMetadata};

/// A bucket reached through an S3 compatible API.
///
/// Google Cloud Storage exposes one of these through its XML API when
/// using HMAC keys, which is how faceclaims are stored in production.
pub struct BlobStorageBackend {
    name: String,
    bucket: Box<Bucket>,
}

impl BlobStorageBackend {
    pub async fn open(
        name: &str,
        region: String,
        endpoint: String,
        access_key: Option<&str>,
        secret_key: Option<&str>,
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        let creds = Credentials::new(access_key, secret_key, None, None, None)?;
        let region = Region::Custom { region, endpoint };

        // Bucket names are domains here, virtual host addressing breaks TLS.
        let mut bucket = Bucket::new(name, region, creds)?.with_path_style();
        bucket.set_request_timeout(request_timeout);

        // A one key listing only needs read access to this bucket.
        let (_, code) = bucket
            .list_page(String::new(), None, None, None, Some(1))
            .await
            .with_context(|| format!("Bucket {} does not exist or is not accessible", name))?;
        if code != 200 {
            return Err(anyhow!(
                "Bucket {} does not exist or is not accessible, got status {}",
                name,
                code
            ));
        }

        Ok(Self {
            name: name.to_string(),
            bucket,
        })
    }

    #[allow(dead_code)]
    async fn list_keys(&self, prefix: String) -> Result<Vec<String>> {
        let pages = self.bucket.list(prefix, None).await?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| object.key)
            .collect())
    }
}

#[async_trait]
impl BlobStore for BlobStorageBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: Option<&ObjectMetadata>,
    ) -> Result<()> {
        debug!("Storing blob in bucket {} @ {}", &self.name, key);

        let mut request = self
            .bucket
            .put_object_builder(key, &data)
            .with_content_type(content_type);

        if let Some(metadata) = metadata {
            for (name, value) in metadata.pairs() {
                request = request.with_metadata(name, value)?;
            }
        }

        let code = request.execute().await?.status_code();
        if code != 200 {
            Err(anyhow!(
                "Remote storage bucket did not respond correctly, expected status 200 got {}",
                code
            ))
        } else {
            Ok(())
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let (_, code) = self.bucket.head_object(key).await?;
        match code {
            200 => Ok(true),
            404 => Ok(false),
            other => Err(anyhow!(
                "Remote storage bucket did not respond correctly, expected status 200 got {}",
                other
            )),
        }
    }

    async fn fetch(&self, key: &str) -> Result<Option<Bytes>> {
        debug!("Retrieving blob in bucket {} @ {}", &self.name, key);

        let response = self.bucket.get_object(key).await?;
        match response.status_code() {
            200 => Ok(Some(response.bytes().clone())),
            404 => Ok(None),
            other => Err(anyhow!(
                "Remote storage bucket did not respond correctly, expected status 200 got {}",
                other
            )),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        debug!("Purging blob in bucket {} @ {}", &self.name, key);

        let code = self.bucket.delete_object(key).await?.status_code();
        if code != 200 && code != 204 && code != 404 {
            return Err(anyhow!(
                "Remote storage bucket did not respond correctly, \
                expected status 204 got {}",
                code
            ));
        }

        Ok(())
    }

    fn list(&self, prefix: &str) -> BoxStream<'_, Result<String>> {
        keys_stream(self.list_keys(prefix.to_string()))
    }
}
