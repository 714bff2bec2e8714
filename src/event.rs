//! Upload notifications that trigger a run.
//!
//! The envelope is the object-created notification format:
//! `{"Records": [{"s3": {"bucket": {"name": ..}, "object": {"key": ..}}}]}`.
//! Object keys arrive form-encoded and are decoded here.

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::io::Read;

use crate::error::{Error, Result};
use crate::storage::ObjectRef;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<UploadEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadEvent {
    pub s3: EventEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventEntity {
    pub bucket: EventBucket,
    pub object: EventObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventBucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventObject {
    pub key: String,
}

/// Undo the form encoding applied to object keys in notifications.
pub fn decode_key(key: &str) -> Result<String> {
    let spaced = key.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| Error::Config(format!("object key {:?} is not UTF-8: {}", key, e)))
}

impl UploadBatch {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The uploaded objects, in notification order.
    pub fn objects(&self) -> Result<Vec<ObjectRef>> {
        self.records
            .iter()
            .map(|record| {
                Ok(ObjectRef::new(
                    &record.s3.bucket.name,
                    decode_key(&record.s3.object.key)?,
                ))
            })
            .collect()
    }
}
