use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::storage::{BlobStore, ObjectRef, StorageError};

/// An in-process blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<ObjectRef, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<ObjectRef, Vec<u8>>>, StorageError> {
        self.objects
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, object: &ObjectRef) -> Result<bool, StorageError> {
        Ok(self.objects()?.contains_key(object))
    }

    async fn read(&self, object: &ObjectRef) -> Result<Vec<u8>, StorageError> {
        self.objects()?
            .get(object)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(object.to_string()))
    }

    async fn write(&self, object: &ObjectRef, data: Vec<u8>) -> Result<(), StorageError> {
        self.objects()?.insert(object.clone(), data);
        Ok(())
    }

    async fn create_if_absent(
        &self,
        object: &ObjectRef,
        data: Vec<u8>,
    ) -> Result<bool, StorageError> {
        let mut objects = self.objects()?;
        if objects.contains_key(object) {
            return Ok(false);
        }
        objects.insert(object.clone(), data);
        Ok(true)
    }

    async fn delete(&self, object: &ObjectRef) -> Result<(), StorageError> {
        self.objects()?
            .remove(object)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(object.to_string()))
    }

    async fn copy(&self, destination: &ObjectRef, source: &ObjectRef) -> Result<(), StorageError> {
        let mut objects = self.objects()?;
        let data = objects
            .get(source)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(source.to_string()))?;
        objects.insert(destination.clone(), data);
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .objects()?
            .keys()
            .filter(|object| object.bucket == bucket && object.key.starts_with(prefix))
            .map(|object| object.key.clone())
            .collect())
    }
}
