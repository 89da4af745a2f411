//! Object storage for uploaded documents.
//!
//! Documents are addressed by their original filename. `put` overwrites silently; `list`
//! returns keys in whatever order the backend yields them.

mod memory;
mod s3;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

/// Errors returned by object storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No object is stored under the requested key.
    #[error("Object not found: {0}")]
    NotFound(String),
    /// The backend rejected the request or could not be reached.
    #[error("Object store request failed: {0}")]
    Backend(String),
}

/// Listing entry for a stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object key, equal to the uploaded filename.
    pub key: String,
    /// Last modification time reported by the backend, when known.
    pub last_modified: Option<OffsetDateTime>,
}

/// Key-addressed byte storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Enumerate every stored object.
    async fn list(&self) -> Result<Vec<StoredObject>, StorageError>;

    /// Fetch the bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Issue a time-limited download link, or `None` when the backend cannot.
    async fn presign(&self, key: &str, ttl: Duration) -> Result<Option<String>, StorageError>;
}
