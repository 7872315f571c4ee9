//! Versioned response cache store.
//!
//! - [`memory`]: in-process store, used by tests and ephemeral runs
//! - [`disk`]: persistent store with atomic entry writes and zstd bodies
//!
//! The router only sees the [`CacheStorage`] and [`Cache`] traits, so a
//! store is always injected and never ambient.

pub mod disk;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::request::{Request, RequestKey, Response};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry {path}: {reason}")]
    CorruptEntry { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Only GET requests can be cached, got {0}")]
    UnsupportedMethod(String),

    #[error("Cache {0:?} was deleted")]
    CacheDeleted(String),
}

/// A single named cache version.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Name this cache was opened under.
    fn name(&self) -> &str;

    /// Look up the stored response for `request`'s identity.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>, StorageError>;

    /// Store `response` under `request`'s identity, replacing any previous entry.
    async fn put(&self, request: &Request, response: Response) -> Result<(), StorageError>;

    /// Store a batch. Either every entry is committed or none is.
    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<(), StorageError>;

    /// Remove the entry for `request`. Returns whether one existed.
    async fn delete(&self, request: &Request) -> Result<bool, StorageError>;

    /// Identities currently stored, sorted.
    async fn keys(&self) -> Result<Vec<RequestKey>, StorageError>;
}

/// The set of named caches owned by one worker.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the cache `name`, creating it if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError>;

    /// The cache `name` if it exists. Never creates one.
    async fn get(&self, name: &str) -> Result<Option<Arc<dyn Cache>>, StorageError>;

    /// Whether a cache named `name` exists.
    async fn has(&self, name: &str) -> Result<bool, StorageError>;

    /// Cache names in creation order.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Delete the cache `name`. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, StorageError>;

    /// Search every cache, oldest first, for a match. A cache deleted while
    /// the search runs is skipped.
    async fn match_any(&self, request: &Request) -> Result<Option<Response>, StorageError> {
        for name in self.keys().await? {
            let Some(cache) = self.get(&name).await? else {
                continue;
            };
            if let Some(response) = cache.match_request(request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// Shared handle to an injected cache store.
pub type SharedStorage = Arc<dyn CacheStorage>;

pub(crate) fn ensure_cacheable(request: &Request) -> Result<(), StorageError> {
    if request.method != http::Method::GET {
        return Err(StorageError::UnsupportedMethod(request.method.to_string()));
    }
    Ok(())
}
