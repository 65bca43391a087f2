//! Filesystem blob store
//!
//! Bodies live under a root directory, one file per canonical key. File names
//! are the SHA-256 of the key, sharded by their first two hex characters, so
//! keys such as `a.com/x` and `a.com/x/y` never collide as file and directory
//! and no key can address a path outside the root.

use crate::storage::traits::{BlobStore, StorageError, StorageResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Blob store writing one file per key under `root`
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file a key is stored in
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }

        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        Ok(self.root.join(&digest[..2]).join(&digest))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put_blob(&self, key: &str, body: &[u8]) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let dir = path.parent().unwrap_or(self.root.as_path());
        tokio::fs::create_dir_all(dir).await?;

        // One temp file per write; readers only ever see complete bodies and
        // the last rename wins between concurrent writers of a key
        let tmp = tempfile::Builder::new()
            .prefix(".put-")
            .tempfile_in(dir)?
            .into_temp_path();
        tokio::fs::write(&tmp, body).await?;
        tmp.persist(&path).map_err(|e| e.error)?;

        tracing::debug!("Stored {} bytes for {} at {}", body.len(), key, path.display());
        Ok(())
    }

    async fn get_blob(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
