use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::storage::{keys_stream, BlobStore, ObjectMetadata};

/// Sidecar directory holding the content type and metadata of each blob.
const META_DIR: &str = ".meta";

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    metadata: Option<ObjectMetadata>,
}

/// A bucket backed by a local directory.
///
/// Intended for local development and tests, every bucket is a
/// sub-directory of the configured root.
pub struct FileSystemBackend {
    name: String,
    directory: PathBuf,
}

impl FileSystemBackend {
    pub async fn open(root: &Path, name: &str) -> Result<Self> {
        let directory = root.join(name);
        tokio::fs::create_dir_all(directory.join(META_DIR)).await?;

        Ok(Self {
            name: name.to_string(),
            directory,
        })
    }

    #[inline]
    fn format_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let is_plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        let is_sidecar = relative.components().next() == Some(Component::Normal(META_DIR.as_ref()));

        if key.is_empty() || !is_plain || is_sidecar {
            return Err(anyhow!("Invalid blob key {:?}", key));
        }

        Ok(self.directory.join(relative))
    }

    #[inline]
    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.directory.join(META_DIR).join(format!("{}.json", key))
    }

    async fn write_creating_parents(path: &Path, data: &[u8]) -> Result<()> {
        match tokio::fs::write(path, data).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, data).await?;
                Ok(())
            },
            Err(other) => Err(other.into()),
        }
    }

    #[allow(dead_code)]
    async fn remove_if_present(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    /// The content type and metadata stored alongside a blob.
    #[cfg(test)]
    pub async fn describe(&self, key: &str) -> Result<Option<(String, Option<ObjectMetadata>)>> {
        match tokio::fs::read(self.sidecar_path(key)).await {
            Ok(data) => {
                let sidecar: Sidecar = serde_json::from_slice(&data)?;
                Ok(Some((sidecar.content_type, sidecar.metadata)))
            },
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    #[allow(dead_code)]
    async fn list_keys(&self, prefix: String) -> Result<Vec<String>> {
        let mut keys = vec![];
        let mut pending = vec![self.directory.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    if path != self.directory.join(META_DIR) {
                        pending.push(path);
                    }
                    continue;
                }

                let key = path
                    .strip_prefix(&self.directory)?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if key.starts_with(&prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl BlobStore for FileSystemBackend {
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
        let path = self.format_path(key)?;
        let sidecar = Sidecar {
            content_type: content_type.to_string(),
            metadata: metadata.cloned(),
        };

        debug!("Storing blob @ {:?}", &path);
        Self::write_creating_parents(&path, &data).await?;
        Self::write_creating_parents(&self.sidecar_path(key), &serde_json::to_vec(&sidecar)?).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.format_path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(other) => Err(other.into()),
        }
    }

    async fn fetch(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.format_path(key)?;

        debug!("Retrieving blob @ {:?}", &path);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.format_path(key)?;

        debug!("Purging blob @ {:?}", &path);
        Self::remove_if_present(&path).await?;
        Self::remove_if_present(&self.sidecar_path(key)).await
    }

    fn list(&self, prefix: &str) -> BoxStream<'_, Result<String>> {
        keys_stream(self.list_keys(prefix.to_string()))
    }
}
