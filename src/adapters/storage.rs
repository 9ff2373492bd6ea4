//! Filesystem-backed object storage.
//!
//! Each bucket is a directory under the storage root. Objects are written
//! once and served back through `GET /storage/{bucket}/{path}`, which is also
//! the shape of the public URL returned by [`ObjectStorage::put`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::ObjectStorage;
use crate::config::paths::is_safe_object_path;

/// Buckets as directories on local disk
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    /// Create storage rooted at `root`, publishing URLs under `public_base_url`
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Public URL for an object
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/{}/{}", self.public_base_url, bucket, path)
    }

    fn object_path(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        if !is_safe_object_path(bucket) || bucket.contains('/') {
            anyhow::bail!("Invalid bucket name: {}", bucket);
        }
        if !is_safe_object_path(path) {
            anyhow::bail!("Invalid object path: {}", path);
        }
        Ok(self.root.join(bucket).join(path))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<String> {
        let target = self.object_path(bucket, path)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .with_context(|| format!("Failed to create object {}/{}", bucket, path))?;

        file.write_all(bytes)
            .await
            .with_context(|| format!("Failed to write object {}/{}", bucket, path))?;
        file.flush().await?;

        Ok(self.public_url(bucket, path))
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<()> {
        let target = self.object_path(bucket, path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete object {}/{}", bucket, path)),
        }
    }

    async fn read(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let target = self.object_path(bucket, path)?;
        match fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read object {}/{}", bucket, path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (LocalObjectStorage, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = LocalObjectStorage::new(temp.path(), "http://localhost:3000/");
        (storage, temp)
    }

    #[tokio::test]
    async fn test_put_read_remove() {
        let (storage, _temp) = storage();

        let url = storage
            .put("reflections", "user-1/1.webm", b"audio", "audio/webm")
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:3000/storage/reflections/user-1/1.webm");

        let bytes = storage.read("reflections", "user-1/1.webm").await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"audio"[..]));

        storage.remove("reflections", "user-1/1.webm").await.unwrap();
        assert!(storage
            .read("reflections", "user-1/1.webm")
            .await
            .unwrap()
            .is_none());

        // Removing again is fine
        storage.remove("reflections", "user-1/1.webm").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_never_overwrites() {
        let (storage, _temp) = storage();

        storage
            .put("reflections", "u/1.mp3", b"first", "audio/mpeg")
            .await
            .unwrap();
        let second = storage
            .put("reflections", "u/1.mp3", b"second", "audio/mpeg")
            .await;
        assert!(second.is_err());

        let bytes = storage.read("reflections", "u/1.mp3").await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"first"[..]));
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let (storage, _temp) = storage();

        assert!(storage
            .put("reflections", "../escape.webm", b"x", "audio/webm")
            .await
            .is_err());
        assert!(storage.read("..", "x").await.is_err());
    }
}
