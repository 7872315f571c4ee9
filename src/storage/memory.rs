//! In-memory cache store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::request::{Request, RequestKey, Response};
use crate::storage::{ensure_cacheable, Cache, CacheStorage, StorageError};

/// One named cache held in memory.
pub struct MemoryCache {
    name: String,
    entries: RwLock<HashMap<RequestKey, Response>>,
    deleted: AtomicBool,
}

impl MemoryCache {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
            deleted: AtomicBool::new(false),
        }
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_live(&self) -> Result<(), StorageError> {
        if self.deleted.load(Ordering::Acquire) {
            return Err(StorageError::CacheDeleted(self.name.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, StorageError> {
        Ok(self.entries.read().await.get(&request.key()).cloned())
    }

    async fn put(&self, request: &Request, response: Response) -> Result<(), StorageError> {
        ensure_cacheable(request)?;
        self.check_live()?;
        let key = request.key();
        debug!(cache = %self.name, key = %key, status = %response.status, "Stored entry");
        self.entries.write().await.insert(key, response);
        Ok(())
    }

    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<(), StorageError> {
        for (request, _) in &entries {
            ensure_cacheable(request)?;
        }
        self.check_live()?;
        let mut map = self.entries.write().await;
        for (request, response) in entries {
            map.insert(request.key(), response);
        }
        Ok(())
    }

    async fn delete(&self, request: &Request) -> Result<bool, StorageError> {
        Ok(self.entries.write().await.remove(&request.key()).is_some())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StorageError> {
        let mut keys: Vec<RequestKey> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// In-memory set of named caches, kept in creation order.
#[derive(Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<Vec<Arc<MemoryCache>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, ready to inject into a router.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError> {
        if let Some(cache) = self.caches.read().await.iter().find(|c| c.name == name) {
            return Ok(cache.clone());
        }

        let mut caches = self.caches.write().await;
        // Another task may have created it between the two locks.
        if let Some(cache) = caches.iter().find(|c| c.name == name) {
            return Ok(cache.clone());
        }
        let cache = Arc::new(MemoryCache::new(name));
        caches.push(cache.clone());
        debug!(cache = name, "Created cache");
        Ok(cache)
    }

    async fn get(&self, name: &str) -> Result<Option<Arc<dyn Cache>>, StorageError> {
        Ok(self
            .caches
            .read()
            .await
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.clone() as Arc<dyn Cache>))
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.caches.read().await.iter().any(|c| c.name == name))
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.caches.read().await.iter().map(|c| c.name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut caches = self.caches.write().await;
        match caches.iter().position(|c| c.name == name) {
            Some(index) => {
                let cache = caches.remove(index);
                cache.deleted.store(true, Ordering::Release);
                debug!(cache = name, "Deleted cache");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
