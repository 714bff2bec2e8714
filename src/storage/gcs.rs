use async_trait::async_trait;
use google_cloud_auth::credentials::CredentialsFile;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::{
    copy::CopyObjectRequest, delete::DeleteObjectRequest, download::Range,
    get::GetObjectRequest, list::ListObjectsRequest, upload::Media, upload::UploadObjectRequest,
    upload::UploadType,
};
use google_cloud_storage::http::Error as GcsError;

use crate::storage::{BlobStore, ObjectRef, StorageError};

/// Blob store backed by Google Cloud Storage.
pub struct GcsBlobStore {
    client: Client,
}

impl std::fmt::Debug for GcsBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsBlobStore").finish()
    }
}

impl GcsBlobStore {
    pub async fn new(creds: Option<CredentialsFile>) -> Result<Self, StorageError> {
        let config = ClientConfig::default();
        let config = if let Some(creds) = creds {
            config
                .with_credentials(creds)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            config
                .with_auth()
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        Ok(Self {
            client: Client::new(config),
        })
    }
}

fn convert(object: &ObjectRef, e: GcsError) -> StorageError {
    match e {
        GcsError::Response(ref r) if r.code == 404 => StorageError::NotFound(object.to_string()),
        e => StorageError::Backend(e.to_string()),
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn exists(&self, object: &ObjectRef) -> Result<bool, StorageError> {
        let request = GetObjectRequest {
            bucket: object.bucket.clone(),
            object: object.key.clone(),
            ..Default::default()
        };
        match self.client.get_object(&request).await {
            Ok(_) => Ok(true),
            Err(GcsError::Response(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    async fn read(&self, object: &ObjectRef) -> Result<Vec<u8>, StorageError> {
        let request = GetObjectRequest {
            bucket: object.bucket.clone(),
            object: object.key.clone(),
            ..Default::default()
        };
        self.client
            .download_object(&request, &Range::default())
            .await
            .map_err(|e| convert(object, e))
    }

    async fn write(&self, object: &ObjectRef, data: Vec<u8>) -> Result<(), StorageError> {
        let request = UploadObjectRequest {
            bucket: object.bucket.clone(),
            ..Default::default()
        };
        let upload_type = UploadType::Simple(Media::new(object.key.clone()));
        self.client
            .upload_object(&request, data, &upload_type)
            .await
            .map_err(|e| convert(object, e))?;
        Ok(())
    }

    async fn create_if_absent(
        &self,
        object: &ObjectRef,
        data: Vec<u8>,
    ) -> Result<bool, StorageError> {
        // Generation 0 only matches an object that does not exist yet.
        let request = UploadObjectRequest {
            bucket: object.bucket.clone(),
            if_generation_match: Some(0),
            ..Default::default()
        };
        let upload_type = UploadType::Simple(Media::new(object.key.clone()));
        match self
            .client
            .upload_object(&request, data, &upload_type)
            .await
        {
            Ok(_) => Ok(true),
            Err(GcsError::Response(e)) if e.code == 412 => Ok(false),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    async fn delete(&self, object: &ObjectRef) -> Result<(), StorageError> {
        let request = DeleteObjectRequest {
            bucket: object.bucket.clone(),
            object: object.key.clone(),
            ..Default::default()
        };
        self.client
            .delete_object(&request)
            .await
            .map_err(|e| convert(object, e))
    }

    async fn copy(&self, destination: &ObjectRef, source: &ObjectRef) -> Result<(), StorageError> {
        let request = CopyObjectRequest {
            source_bucket: source.bucket.clone(),
            source_object: source.key.clone(),
            destination_bucket: destination.bucket.clone(),
            destination_object: destination.key.clone(),
            ..Default::default()
        };
        self.client
            .copy_object(&request)
            .await
            .map_err(|e| convert(source, e))?;
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut page_token = None;
        loop {
            let request = ListObjectsRequest {
                bucket: bucket.to_string(),
                prefix: Some(prefix.to_string()),
                page_token: page_token.take(),
                ..Default::default()
            };
            let response = self
                .client
                .list_objects(&request)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            keys.extend(response.items.unwrap_or_default().into_iter().map(|o| o.name));
            match response.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        keys.sort();
        Ok(keys)
    }
}
