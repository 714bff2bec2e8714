//! Exclusive access to the repository tree.
//!
//! The lock is a single object created with [`BlobStore::create_if_absent`]
//! that records the owning invocation. Only that owner may delete it again.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::storage::{cancellable, BlobStore, ObjectRef};

/// Identity of one invocation; generated once and passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// A fresh random identity.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OwnerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contents of the lock object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    #[serde(rename = "ownerID")]
    pub owner_id: OwnerId,
}

/// Retry schedule for lock acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    /// Jitter applied to every delay, between 0 and 1.
    pub randomization_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            randomization_factor: 0.5,
        }
    }
}

impl BackoffPolicy {
    /// Retry up to `max_attempts` times without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: Duration::ZERO,
            multiplier: 1.0,
            max_interval: Duration::ZERO,
            randomization_factor: 0.0,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_multiplier(self.multiplier)
            .with_max_interval(self.max_interval)
            .with_randomization_factor(self.randomization_factor)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Acquires and releases the repository lock.
#[derive(Clone)]
pub struct LockCoordinator {
    store: Arc<dyn BlobStore>,
    object: ObjectRef,
    policy: BackoffPolicy,
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("object", &self.object)
            .field("policy", &self.policy)
            .finish()
    }
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn BlobStore>, object: ObjectRef, policy: BackoffPolicy) -> Self {
        Self {
            store,
            object,
            policy,
        }
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    /// Take the lock for `owner`.
    ///
    /// Both "already held" and failed create attempts are retried on the
    /// backoff schedule. Once the attempts are used up this fails with
    /// [`Error::LockConflict`] and nothing has been written.
    pub async fn acquire(&self, owner: &OwnerId, cancel: &CancellationToken) -> Result<()> {
        let record = serde_json::to_vec(&LockRecord {
            owner_id: owner.clone(),
        })?;
        let mut backoff = self.policy.backoff();
        let mut last = String::from("no attempt made");
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match cancellable(
                cancel,
                self.store.create_if_absent(&self.object, record.clone()),
            )
            .await
            {
                Ok(true) => {
                    info!(lock = %self.object, owner = %owner, attempt, "Lock acquired");
                    return Ok(());
                }
                Ok(false) => {
                    last = "lock is held by another invocation".to_string();
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    last = e.to_string();
                }
            }

            if attempt == max_attempts {
                break;
            }
            let delay = backoff
                .next_backoff()
                .unwrap_or(self.policy.max_interval);
            warn!(
                lock = %self.object,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Lock not acquired, retrying: {}",
                last
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        Err(Error::LockConflict {
            attempts: max_attempts,
            last,
        })
    }

    /// Release the lock held by `owner`.
    ///
    /// The object is only deleted when it records `owner`; otherwise this
    /// fails with [`Error::LockOwnershipMismatch`] and leaves it in place.
    pub async fn release(&self, owner: &OwnerId) -> Result<()> {
        let data = self.store.read(&self.object).await?;
        let record: LockRecord = serde_json::from_slice(&data)?;
        if &record.owner_id != owner {
            return Err(Error::LockOwnershipMismatch {
                expected: owner.to_string(),
                found: record.owner_id.to_string(),
            });
        }
        self.store.delete(&self.object).await?;
        info!(lock = %self.object, owner = %owner, "Lock released");
        Ok(())
    }
}
