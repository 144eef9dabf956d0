//! Filesystem-backed object store.
//!
//! Keys map directly onto paths under a configured root. Writes are atomic
//! (temp file + rename) so a crashed upload never leaves a half-written
//! mesh behind a live key. Content types are not persisted; the filesystem
//! deployment serves files by extension. An S3-compatible adapter can
//! replace this behind the same port.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::infrastructure::ports::{ObjectStoreError, ObjectStorePort};

pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key to a path, rejecting traversal segments.
    fn resolve(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        if key.is_empty() || key.starts_with('/') {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        if key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    async fn ensure_parent(path: &Path, key: &str) -> Result<(), ObjectStoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ObjectStoreError::io(key, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorePort for FsObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(ObjectStoreError::io(key, e)),
        }
    }

    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        let path = self.resolve(key)?;
        Self::ensure_parent(&path, key).await?;

        // Write to a sibling temp file, then rename into place. The temp
        // name keeps the full filename so two objects differing only in
        // extension can't share a temp path.
        let tmp = path.with_file_name(format!(
            "{}.tmp-upload",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "object".to_string())
        ));
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| ObjectStoreError::io(key, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| ObjectStoreError::io(key, e))?;
        file.sync_all()
            .await
            .map_err(|e| ObjectStoreError::io(key, e))?;
        drop(file);

        fs::rename(&tmp, &path)
            .await
            .map_err(|e| ObjectStoreError::io(key, e))?;

        Ok(key.to_string())
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<(), ObjectStoreError> {
        let source = self.resolve(source_key)?;
        let dest = self.resolve(dest_key)?;
        Self::ensure_parent(&dest, dest_key).await?;

        match fs::copy(&source, &dest).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(source_key.to_string()))
            }
            Err(e) => Err(ObjectStoreError::io(dest_key, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Deleting a missing object is a no-op, matching S3 semantics.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ObjectStoreError::io(key, e)),
        }
    }
}
