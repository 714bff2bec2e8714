//! Blob storage for the repository tree.
//!
//! [`BlobStore`] is the object-store collaborator: flat keys grouped into
//! buckets, with an atomic create-if-absent used for locking. [`Tree`] is the
//! per-invocation view of the destination bucket that the indexing code works
//! against.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

mod local;
mod memory;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

#[cfg(feature = "gcs")]
mod gcs;

#[cfg(feature = "gcs")]
pub use gcs::GcsBlobStore;

use crate::error::{Error, Result};

/// Errors reported by blob store backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The object does not exist.
    #[error("{0} does not exist")]
    NotFound(String),

    /// The key cannot be mapped onto the backend.
    #[error("invalid object key {0:?}")]
    InvalidKey(String),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

/// Location of one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Bucket name.
    pub bucket: String,
    /// Key within the bucket.
    pub key: String,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new<B: Into<String>, K: Into<String>>(bucket: B, key: K) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse a `<scheme>://<bucket>/<key>` locator.
    pub fn from_url(locator: &str) -> Result<Self> {
        let url = url::Url::parse(locator)
            .map_err(|e| Error::Config(format!("invalid locator {:?}: {}", locator, e)))?;
        let bucket = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Config(format!("locator {:?} has no bucket", locator)))?;
        let key = url.path().trim_start_matches('/');
        if key.is_empty() {
            return Err(Error::Config(format!("locator {:?} has no key", locator)));
        }
        Ok(Self::new(bucket, key))
    }

    /// The final path segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// An object store holding the repository tree, incoming uploads and the
/// lock object.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Check whether an object exists; only a definite "missing" is `false`.
    async fn exists(&self, object: &ObjectRef) -> std::result::Result<bool, StorageError>;

    /// Read a whole object.
    async fn read(&self, object: &ObjectRef) -> std::result::Result<Vec<u8>, StorageError>;

    /// Create or replace an object.
    async fn write(&self, object: &ObjectRef, data: Vec<u8>)
        -> std::result::Result<(), StorageError>;

    /// Atomically create an object unless it already exists.
    ///
    /// Returns `Ok(false)` when another writer got there first.
    async fn create_if_absent(
        &self,
        object: &ObjectRef,
        data: Vec<u8>,
    ) -> std::result::Result<bool, StorageError>;

    /// Delete an object.
    async fn delete(&self, object: &ObjectRef) -> std::result::Result<(), StorageError>;

    /// Server-side copy of `source` to `destination`.
    async fn copy(
        &self,
        destination: &ObjectRef,
        source: &ObjectRef,
    ) -> std::result::Result<(), StorageError>;

    /// List the keys in `bucket` that start with `prefix`, sorted.
    async fn list(&self, bucket: &str, prefix: &str)
        -> std::result::Result<Vec<String>, StorageError>;

    /// Fetch an object into a scratch file that is removed when dropped.
    async fn download(&self, object: &ObjectRef) -> std::result::Result<NamedTempFile, StorageError> {
        let data = self.read(object).await?;
        let mut file = tempfile::Builder::new().prefix("apt-bucket").tempfile()?;
        file.write_all(&data)?;
        file.flush()?;
        Ok(file)
    }
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T, E, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<Error>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result.map_err(Into::into),
    }
}

/// The destination repository tree: one bucket plus a base path.
///
/// All paths taken and returned by `Tree` are relative to the base path.
#[derive(Clone)]
pub struct Tree {
    store: Arc<dyn BlobStore>,
    bucket: String,
    base: String,
    cancel: CancellationToken,
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("bucket", &self.bucket)
            .field("base", &self.base)
            .finish()
    }
}

impl Tree {
    /// Create a tree view whose operations abort once `cancel` fires.
    pub fn new<B: Into<String>>(
        store: Arc<dyn BlobStore>,
        bucket: B,
        base: &str,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            base: base.trim_matches('/').to_string(),
            cancel,
        }
    }

    /// The object a tree-relative path refers to.
    pub fn object(&self, path: &str) -> ObjectRef {
        let path = path.trim_start_matches('/');
        if self.base.is_empty() {
            ObjectRef::new(&self.bucket, path)
        } else {
            ObjectRef::new(&self.bucket, format!("{}/{}", self.base, path))
        }
    }

    /// Run `fut` unless this tree's run is cancelled first.
    pub async fn guard<T, E, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<Error>,
    {
        cancellable(&self.cancel, fut).await
    }

    /// Map a bucket key back to a tree-relative path.
    fn relative<'a>(&self, key: &'a str) -> Option<&'a str> {
        if self.base.is_empty() {
            Some(key)
        } else {
            key.strip_prefix(&self.base)?.strip_prefix('/')
        }
    }

    /// Check whether a path exists.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        cancellable(&self.cancel, self.store.exists(&self.object(path))).await
    }

    /// Read a path.
    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        cancellable(&self.cancel, self.store.read(&self.object(path))).await
    }

    /// Write a path.
    pub async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        cancellable(&self.cancel, self.store.write(&self.object(path), data)).await
    }

    /// Copy an object from anywhere in the store to a path in this tree.
    pub async fn copy_from(&self, path: &str, source: &ObjectRef) -> Result<()> {
        cancellable(&self.cancel, self.store.copy(&self.object(path), source)).await
    }

    /// List tree-relative paths under `prefix`, sorted.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix_key = self.object(prefix).key;
        let keys = cancellable(&self.cancel, self.store.list(&self.bucket, &prefix_key)).await?;
        Ok(keys
            .iter()
            .filter_map(|key| self.relative(key))
            .map(str::to_string)
            .collect())
    }

    /// Download any object into a scratch file.
    pub async fn download(&self, source: &ObjectRef) -> Result<NamedTempFile> {
        cancellable(&self.cancel, self.store.download(source)).await
    }

    /// Download a path of this tree into a scratch file.
    pub async fn download_path(&self, path: &str) -> Result<NamedTempFile> {
        let object = self.object(path);
        self.download(&object).await
    }
}
