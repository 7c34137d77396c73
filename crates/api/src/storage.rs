//! Local-disk object storage.
//!
//! Objects live under a root directory and are served by the API's
//! `/files` route, so a stored key maps directly to a URL. That route only
//! answers the submitter of the job a key belongs to.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use swatch_core::ports::{ObjectStorage, StorageError, StoredObject};
use swatch_core::types::JobId;

/// Prefix of every key this store writes.
const IMPORTS_PREFIX: &str = "imports";

#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }

    /// Resolve a key under the root, refusing anything that could escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn put(&self, key: String, bytes: Vec<u8>) -> Result<StoredObject, StorageError> {
        let path = self.path_for(&key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        tracing::debug!(key = %key, size = bytes.len(), "Stored object");
        Ok(StoredObject {
            url: self.url_for(&key),
            key,
        })
    }
}

/// Reduce an uploaded filename to a single safe path segment.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload.csv".to_string()
    } else {
        cleaned.to_string()
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn put_source(
        &self,
        job_id: JobId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, StorageError> {
        let key = format!(
            "{IMPORTS_PREFIX}/{job_id}/source/{}",
            sanitize_filename(filename)
        );
        self.put(key, bytes).await
    }

    async fn put_artifact(
        &self,
        job_id: JobId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, StorageError> {
        let key = format!(
            "{IMPORTS_PREFIX}/{job_id}/artifacts/{}",
            sanitize_filename(file_name)
        );
        self.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key = %key, "Deleted object");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
