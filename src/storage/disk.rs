//! Persistent cache store on the local filesystem.
//!
//! Layout under the configured root:
//!
//! ```text
//! <root>/caches.json                  cache names in creation order
//! <root>/<hex(name)>/<sha256>.entry   one file per stored response
//! ```
//!
//! An entry file is a little-endian `u32` header length, a JSON header and
//! the (optionally zstd-compressed) body. Entries are written to a temporary
//! file and renamed into place, so a reader never observes a partial entry.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::request::{Request, RequestKey, Response};
use crate::storage::{ensure_cacheable, Cache, CacheStorage, StorageError};

const MANIFEST_FILE: &str = "caches.json";
const ENTRY_EXT: &str = "entry";

/// Metadata stored ahead of the body in every entry file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    key: RequestKey,
    status: u16,
    /// Raw value bytes; header values need not be UTF-8.
    headers: Vec<(String, Vec<u8>)>,
    url: Option<String>,
    compressed: bool,
}

/// Body encoding shared by every cache opened from one storage root.
#[derive(Debug, Clone, Copy)]
struct BodyCodec {
    compress: bool,
    level: i32,
}

impl BodyCodec {
    fn encode(&self, body: &[u8]) -> Result<Vec<u8>, StorageError> {
        if self.compress {
            Ok(zstd::encode_all(body, self.level)?)
        } else {
            Ok(body.to_vec())
        }
    }

    fn decode(data: &[u8], compressed: bool) -> Result<Vec<u8>, StorageError> {
        if compressed {
            Ok(zstd::decode_all(data)?)
        } else {
            Ok(data.to_vec())
        }
    }
}

/// One named cache stored as a directory of entry files.
pub struct DiskCache {
    name: String,
    dir: PathBuf,
    codec: BodyCodec,
}

impl DiskCache {
    fn entry_path(&self, key: &RequestKey) -> PathBuf {
        let digest = Sha256::digest(key.to_string().as_bytes());
        self.dir.join(format!("{}.{ENTRY_EXT}", hex::encode(digest)))
    }

    fn encode_entry(&self, key: RequestKey, response: &Response) -> Result<Vec<u8>, StorageError> {
        let header = EntryHeader {
            key,
            status: response.status.as_u16(),
            headers: response
                .headers
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
                .collect(),
            url: response.url.as_ref().map(|u| u.to_string()),
            compressed: self.codec.compress,
        };
        let header = serde_json::to_vec(&header)?;
        let body = self.codec.encode(&response.body)?;

        let mut out = Vec::with_capacity(4 + header.len() + body.len());
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decode_entry(path: &Path, data: &[u8]) -> Result<(EntryHeader, Response), StorageError> {
        let corrupt = |reason: &str| StorageError::CorruptEntry {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if data.len() < 4 {
            return Err(corrupt("truncated header length"));
        }
        let header_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let body_start = 4 + header_len;
        if data.len() < body_start {
            return Err(corrupt("truncated header"));
        }

        let header: EntryHeader = serde_json::from_slice(&data[4..body_start])?;
        let status = StatusCode::from_u16(header.status).map_err(|_| corrupt("invalid status"))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &header.headers {
            match (HeaderName::from_str(name), HeaderValue::from_bytes(value)) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => debug!(path = %path.display(), header = %name, "Dropping invalid stored header"),
            }
        }

        let body = BodyCodec::decode(&data[body_start..], header.compressed)?;
        let url = header.url.as_deref().and_then(|u| Url::parse(u).ok());

        let response = Response {
            status,
            headers,
            body: Bytes::from(body),
            url,
        };
        Ok((header, response))
    }

    /// Write `data` to a temp file next to `path`; the caller renames it.
    async fn write_temp(&self, path: &Path, data: &[u8]) -> Result<PathBuf, StorageError> {
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        fs::write(&tmp, data).await?;
        Ok(tmp)
    }

    async fn ensure_live(&self) -> Result<(), StorageError> {
        if fs::try_exists(&self.dir).await? {
            Ok(())
        } else {
            Err(StorageError::CacheDeleted(self.name.clone()))
        }
    }
}

#[async_trait]
impl Cache for DiskCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, StorageError> {
        let path = self.entry_path(&request.key());
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let (_, response) = Self::decode_entry(&path, &data)?;
        debug!(cache = %self.name, path = %path.display(), "Read entry from disk");
        Ok(Some(response))
    }

    async fn put(&self, request: &Request, response: Response) -> Result<(), StorageError> {
        ensure_cacheable(request)?;
        self.ensure_live().await?;

        let key = request.key();
        let path = self.entry_path(&key);
        let data = self.encode_entry(key, &response)?;
        let tmp = self.write_temp(&path, &data).await?;

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(
            cache = %self.name,
            path = %path.display(),
            size = data.len(),
            "Wrote entry to disk"
        );
        Ok(())
    }

    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<(), StorageError> {
        for (request, _) in &entries {
            ensure_cacheable(request)?;
        }
        self.ensure_live().await?;

        // Stage every entry before committing any of them.
        let mut staged = Vec::with_capacity(entries.len());
        for (request, response) in &entries {
            let key = request.key();
            let path = self.entry_path(&key);
            let staged_entry = match self.encode_entry(key, response) {
                Ok(data) => self.write_temp(&path, &data).await,
                Err(e) => Err(e),
            };
            match staged_entry {
                Ok(tmp) => staged.push((tmp, path)),
                Err(e) => {
                    for (tmp, _) in &staged {
                        let _ = fs::remove_file(tmp).await;
                    }
                    return Err(e);
                }
            }
        }

        for (i, (tmp, path)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, path).await {
                // Entries before `i` stay committed.
                for (tmp, _) in &staged[i..] {
                    let _ = fs::remove_file(tmp).await;
                }
                warn!(cache = %self.name, committed = i, error = %e, "Entry batch commit failed");
                return Err(e.into());
            }
        }
        debug!(cache = %self.name, count = staged.len(), "Committed entry batch");
        Ok(())
    }

    async fn delete(&self, request: &Request) -> Result<bool, StorageError> {
        let path = self.entry_path(&request.key());
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StorageError> {
        let mut keys = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            let data = fs::read(&path).await?;
            match Self::decode_entry(&path, &data) {
                Ok((header, _)) => keys.push(header.key),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable entry"),
            }
        }

        keys.sort();
        Ok(keys)
    }
}

/// Filesystem-backed set of named caches.
pub struct DiskCacheStorage {
    root: PathBuf,
    codec: BodyCodec,

    /// Cache names in creation order, mirrored to `caches.json`.
    manifest: Mutex<Vec<String>>,
}

impl DiskCacheStorage {
    /// Open (or create) a store rooted at `config.path`.
    pub async fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.path).await?;

        let manifest_path = config.path.join(MANIFEST_FILE);
        let manifest = if fs::try_exists(&manifest_path).await? {
            let data = fs::read(&manifest_path).await?;
            serde_json::from_slice(&data)?
        } else {
            Vec::new()
        };

        Ok(Self {
            root: config.path.clone(),
            codec: BodyCodec {
                compress: config.compress_bodies,
                level: config.zstd_level,
            },
            manifest: Mutex::new(manifest),
        })
    }

    /// Shared handle, ready to inject into a router.
    pub async fn shared(config: &StorageConfig) -> Result<Arc<Self>, StorageError> {
        Ok(Arc::new(Self::new(config).await?))
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(hex::encode(name.as_bytes()))
    }

    async fn save_manifest(&self, names: &[String]) -> Result<(), StorageError> {
        let path = self.root.join(MANIFEST_FILE);
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        fs::write(&tmp, serde_json::to_vec(names)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError> {
        let dir = self.cache_dir(name);
        let mut manifest = self.manifest.lock().await;
        if !manifest.iter().any(|n| n == name) {
            fs::create_dir_all(&dir).await?;
            manifest.push(name.to_string());
            self.save_manifest(&manifest).await?;
            debug!(cache = name, dir = %dir.display(), "Created cache");
        }

        Ok(Arc::new(DiskCache {
            name: name.to_string(),
            dir,
            codec: self.codec,
        }))
    }

    async fn get(&self, name: &str) -> Result<Option<Arc<dyn Cache>>, StorageError> {
        if !self.manifest.lock().await.iter().any(|n| n == name) {
            return Ok(None);
        }
        Ok(Some(Arc::new(DiskCache {
            name: name.to_string(),
            dir: self.cache_dir(name),
            codec: self.codec,
        })))
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.manifest.lock().await.iter().any(|n| n == name))
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.manifest.lock().await.clone())
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut manifest = self.manifest.lock().await;
        let Some(index) = manifest.iter().position(|n| n == name) else {
            return Ok(false);
        };

        manifest.remove(index);
        self.save_manifest(&manifest).await?;

        let dir = self.cache_dir(name);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(cache = name, "Deleted cache");
        Ok(true)
    }
}
