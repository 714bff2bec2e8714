use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use crate::storage::{BlobStore, ObjectRef, StorageError};

/// A blob store on the local filesystem.
///
/// Buckets are directories directly under the root; keys map onto paths
/// below them.
#[derive(Debug)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: &Path) -> std::io::Result<Self> {
        if !root.is_dir() {
            std::fs::create_dir_all(root)?;
        }
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
            return Err(StorageError::InvalidKey(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, object: &ObjectRef) -> Result<PathBuf, StorageError> {
        let key = Path::new(&object.key);
        let valid = !object.key.is_empty()
            && key
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidKey(object.key.clone()));
        }
        Ok(self.bucket_path(&object.bucket)?.join(key))
    }

    fn not_found(object: &ObjectRef, e: std::io::Error) -> StorageError {
        if e.kind() == ErrorKind::NotFound {
            StorageError::NotFound(object.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn collect_keys(dir: &Path, prefix: &str, keys: &mut Vec<String>) -> std::io::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        // Leftovers of interrupted writes.
        if name.starts_with(".tmp") {
            continue;
        }
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        if entry.file_type()?.is_dir() {
            collect_keys(&entry.path(), &key, keys)?;
        } else {
            keys.push(key);
        }
    }
    Ok(())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn exists(&self, object: &ObjectRef) -> Result<bool, StorageError> {
        let path = self.object_path(object)?;
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, object: &ObjectRef) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(object)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| Self::not_found(object, e))
    }

    async fn write(&self, object: &ObjectRef, data: Vec<u8>) -> Result<(), StorageError> {
        let path = self.object_path(object)?;
        ensure_parent(&path)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidKey(object.key.clone()))?;
        // Readers never observe a half-written object.
        let mut tmp = tempfile::Builder::new().prefix(".tmp").tempfile_in(parent)?;
        tmp.write_all(&data)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    async fn create_if_absent(
        &self,
        object: &ObjectRef,
        data: Vec<u8>,
    ) -> Result<bool, StorageError> {
        let path = self.object_path(object)?;
        ensure_parent(&path)?;
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        file.write_all(&data)?;
        file.sync_all()?;
        Ok(true)
    }

    async fn delete(&self, object: &ObjectRef) -> Result<(), StorageError> {
        let path = self.object_path(object)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Self::not_found(object, e))
    }

    async fn copy(&self, destination: &ObjectRef, source: &ObjectRef) -> Result<(), StorageError> {
        let from = self.object_path(source)?;
        let to = self.object_path(destination)?;
        ensure_parent(&to)?;
        tokio::fs::copy(&from, &to)
            .await
            .map_err(|e| Self::not_found(source, e))?;
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let bucket_path = self.bucket_path(bucket)?;
        let mut keys = Vec::new();
        collect_keys(&bucket_path, "", &mut keys)?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}
