//! Publishes Debian packages into an APT repository kept in a blob store.
//!
//! A run takes the repository lock, then either ingests a batch of uploaded
//! packages (appending to the per-architecture Packages indices) or, for an
//! empty batch, rebuilds every index from the pool. Either way the Release
//! manifest is regenerated and signed before the lock is released.

pub mod config;
pub mod error;
pub mod event;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod lock;
pub mod logging;
pub mod publisher;
pub mod reconcile;
pub mod sign;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::RepositoryConfig;
pub use error::{Error, Result};
pub use event::UploadBatch;
pub use lock::{BackoffPolicy, OwnerId};
pub use publisher::{Publisher, RunSummary};
