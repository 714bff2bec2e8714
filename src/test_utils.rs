//! Test utilities shared by the unit tests.
//!
//! Packages in these tests are plain control text rather than real archives;
//! [`ControlTextParser`] reads them back.

use apt_repository::{AptRepositoryError, ControlStanza};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio_util::sync::CancellationToken;

use crate::config::RepositoryConfig;
use crate::error::Result;
use crate::extract::{PackageParser, ParsedPackage};
use crate::sign::{Signer, SigningKey};
use crate::storage::{BlobStore, MemoryBlobStore, ObjectRef, StorageError, Tree};

static INIT: Once = Once::new();

/// Initialize test logging once per process.
pub fn init_test_env() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

/// Treats the package bytes as a UTF-8 control stanza.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlTextParser;

impl PackageParser for ControlTextParser {
    fn parse(&self, data: &[u8]) -> std::result::Result<ParsedPackage, AptRepositoryError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| AptRepositoryError::invalid_package("control text is not UTF-8"))?;
        let control = ControlStanza::parse(text)?;
        Ok(ParsedPackage {
            package: control.require("Package")?.to_string(),
            architecture: control.require("Architecture")?.to_string(),
            control,
        })
    }
}

/// Control text standing in for a package file.
pub fn package_bytes(package: &str, version: &str, architecture: &str) -> Vec<u8> {
    format!(
        "Package: {}\nVersion: {}\nArchitecture: {}\nDescription: test package\n",
        package, version, architecture
    )
    .into_bytes()
}

pub fn sample_config() -> RepositoryConfig {
    RepositoryConfig {
        base_dir: "debian".to_string(),
        distribution: "stable".to_string(),
        origin: "Example".to_string(),
        label: "Example".to_string(),
        suite: "stable".to_string(),
        codename: "stable".to_string(),
        components: vec!["main".to_string()],
        description: "Example repository".to_string(),
        bucket: "repo".to_string(),
        private_key_url: "s3://secrets/private.key".to_string(),
        private_key_passphrase: None,
        lock_url: "s3://locks/apt.lock".to_string(),
    }
}

/// A store plus a tree over the sample config's bucket and base path.
pub fn memory_tree() -> (Arc<MemoryBlobStore>, Tree) {
    let config = sample_config();
    let store = Arc::new(MemoryBlobStore::new());
    let tree = Tree::new(
        store.clone(),
        &config.bucket,
        &config.base_dir,
        CancellationToken::new(),
    );
    (store, tree)
}

/// Signer that wraps its input in markers and records every call.
#[derive(Debug, Default)]
pub struct RecordingSigner {
    pub calls: Mutex<Vec<&'static str>>,
}

#[async_trait]
impl Signer for RecordingSigner {
    async fn sign_cleartext(&self, data: &[u8], _key: &SigningKey) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push("cleartext");
        let mut signed = b"-----BEGIN PGP SIGNED MESSAGE-----\n".to_vec();
        signed.extend_from_slice(data);
        Ok(signed)
    }

    async fn sign_detached(&self, data: &[u8], _key: &SigningKey) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push("detached");
        Ok(format!("-----BEGIN PGP SIGNATURE-----\n{}\n", data.len()).into_bytes())
    }
}

/// Memory store whose `create_if_absent` and `exists` fail with a backend
/// error a configurable number of times before behaving normally.
#[derive(Debug, Default)]
pub struct FlakyBlobStore {
    pub inner: MemoryBlobStore,
    pub create_failures: AtomicU32,
    pub exists_failures: AtomicU32,
    pub create_calls: AtomicU32,
    pub copies: AtomicU32,
}

impl FlakyBlobStore {
    pub fn new(create_failures: u32, exists_failures: u32) -> Self {
        Self {
            create_failures: AtomicU32::new(create_failures),
            exists_failures: AtomicU32::new(exists_failures),
            ..Default::default()
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn exists(&self, object: &ObjectRef) -> std::result::Result<bool, StorageError> {
        if Self::take_failure(&self.exists_failures) {
            return Err(StorageError::Backend("exists timed out".to_string()));
        }
        self.inner.exists(object).await
    }

    async fn read(&self, object: &ObjectRef) -> std::result::Result<Vec<u8>, StorageError> {
        self.inner.read(object).await
    }

    async fn write(
        &self,
        object: &ObjectRef,
        data: Vec<u8>,
    ) -> std::result::Result<(), StorageError> {
        self.inner.write(object, data).await
    }

    async fn create_if_absent(
        &self,
        object: &ObjectRef,
        data: Vec<u8>,
    ) -> std::result::Result<bool, StorageError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.create_failures) {
            return Err(StorageError::Backend("service unavailable".to_string()));
        }
        self.inner.create_if_absent(object, data).await
    }

    async fn delete(&self, object: &ObjectRef) -> std::result::Result<(), StorageError> {
        self.inner.delete(object).await
    }

    async fn copy(
        &self,
        destination: &ObjectRef,
        source: &ObjectRef,
    ) -> std::result::Result<(), StorageError> {
        self.copies.fetch_add(1, Ordering::SeqCst);
        self.inner.copy(destination, source).await
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> std::result::Result<Vec<String>, StorageError> {
        self.inner.list(bucket, prefix).await
    }
}
