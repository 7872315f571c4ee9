//! Cache policy router: the worker's event handlers.
//!
//! One method per event kind:
//! - [`CacheRouter::install`]: pre-cache the app shell and external libraries
//! - [`CacheRouter::activate`]: drop stale cache versions and claim clients
//! - [`CacheRouter::fetch`]: answer a request network-first or cache-first
//! - [`CacheRouter::message`]: handle `"skipWaiting"` from the page
//!
//! Cache writes are best effort everywhere: a failed write is logged and
//! never changes the response.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use http::StatusCode;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::WorkerConfig;
use crate::network::{NetworkError, SharedNetwork};
use crate::request::{FetchMode, Request, Response};
use crate::storage::{Cache, SharedStorage, StorageError};
use crate::worker::lifecycle::WorkerHost;
use crate::worker::strategy::Strategy;

/// Message payload that asks a waiting worker to activate.
pub const SKIP_WAITING_MESSAGE: &str = "skipWaiting";

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Invalid static asset path {path:?}: {source}")]
    InvalidAsset {
        path: String,
        source: url::ParseError,
    },

    #[error("Fetching static asset {url} failed: {source}")]
    Fetch { url: String, source: NetworkError },

    #[error("Static asset {url} returned {status}")]
    BadStatus { url: String, status: StatusCode },

    #[error("Cache store error: {0}")]
    Storage(#[from] StorageError),
}

/// Outcome of a successful install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub static_cached: usize,
    pub external_cached: usize,
    pub external_skipped: usize,
}

/// Where a returned response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
}

/// What the host should do with an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted: the host handles the request as it would without a worker.
    PassThrough,

    /// Answer with `response`.
    Respond {
        response: Response,
        source: ResponseSource,

        /// Background refresh started for a cache hit. Never awaited by the
        /// router; hosts may await or drop it.
        refresh: Option<JoinHandle<()>>,
    },

    /// The network failed and nothing was cached: the request fails.
    NoResponse(NetworkError),
}

impl FetchOutcome {
    /// The response, if the request was answered.
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Respond { response, .. } => Some(response),
            _ => None,
        }
    }
}

/// The worker's request router. Cheap to clone; all state lives in the
/// injected store.
#[derive(Clone)]
pub struct CacheRouter {
    config: Arc<WorkerConfig>,
    storage: SharedStorage,
    network: SharedNetwork,
    host: Arc<dyn WorkerHost>,
}

impl CacheRouter {
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: SharedStorage,
        network: SharedNetwork,
        host: Arc<dyn WorkerHost>,
    ) -> Self {
        Self {
            config,
            storage,
            network,
            host,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    /// Populate the current cache version.
    ///
    /// Every static asset must fetch with a 2xx status or the install fails
    /// and none of them is stored. External assets are then tried
    /// independently and their failures are tolerated. Once everything has
    /// settled the host is asked to skip waiting.
    pub async fn install(&self) -> Result<InstallReport, InstallError> {
        let urls = self
            .config
            .static_assets
            .iter()
            .map(|path| {
                self.config
                    .scope
                    .join(path)
                    .map_err(|source| InstallError::InvalidAsset {
                        path: path.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<Url>, _>>()?;

        let entries = try_join_all(urls.into_iter().map(|url| self.fetch_static(url))).await?;
        let static_cached = entries.len();
        let cache = self.storage.open(&self.config.cache_name).await?;
        cache.put_all(entries).await?;

        let results = join_all(
            self.config
                .external_assets
                .iter()
                .map(|url| self.cache_external(cache.as_ref(), url)),
        )
        .await;
        let external_cached = results.iter().filter(|stored| **stored).count();

        let report = InstallReport {
            static_cached,
            external_cached,
            external_skipped: results.len() - external_cached,
        };
        info!(
            cache = %self.config.cache_name,
            static_cached = report.static_cached,
            external_cached = report.external_cached,
            external_skipped = report.external_skipped,
            "Install complete"
        );

        self.host.skip_waiting().await;
        Ok(report)
    }

    /// Whether the current cache version exists and holds every static asset,
    /// i.e. an earlier install ran to completion.
    pub async fn is_installed(&self) -> Result<bool, StorageError> {
        let Some(cache) = self.storage.get(&self.config.cache_name).await? else {
            return Ok(false);
        };
        for path in &self.config.static_assets {
            let Ok(url) = self.config.scope.join(path) else {
                return Ok(false);
            };
            if cache.match_request(&Request::get(url)).await?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Drop the current cache version, e.g. after a failed install.
    pub async fn discard_current(&self) -> Result<bool, StorageError> {
        self.storage.delete(&self.config.cache_name).await
    }

    async fn fetch_static(&self, url: Url) -> Result<(Request, Response), InstallError> {
        let request = Request::get(url);
        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|source| InstallError::Fetch {
                url: request.url.to_string(),
                source,
            })?;
        if !response.ok() {
            return Err(InstallError::BadStatus {
                url: request.url.to_string(),
                status: response.status,
            });
        }
        Ok((request, response))
    }

    /// Try to store one external asset. Returns whether it was stored.
    async fn cache_external(&self, cache: &dyn Cache, url: &str) -> bool {
        let request = match Request::get_str(url) {
            Ok(request) => request.with_mode(FetchMode::Cors),
            Err(e) => {
                warn!(url, error = %e, "Skipping invalid external asset URL");
                return false;
            }
        };

        let response = match self.network.fetch(&request).await {
            Ok(response) if response.ok() => response,
            Ok(response) => {
                debug!(url, status = %response.status, "External asset not cached");
                return false;
            }
            Err(e) => {
                debug!(url, error = %e, "External asset unavailable");
                return false;
            }
        };

        match cache.put(&request, response).await {
            Ok(()) => true,
            Err(e) => {
                warn!(url, error = %e, "Failed to store external asset");
                false
            }
        }
    }

    /// Delete every cache version except the current one, then claim clients.
    /// Returns the deleted names.
    pub async fn activate(&self) -> Result<Vec<String>, StorageError> {
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| *name != self.config.cache_name)
            .collect();

        let removed = try_join_all(stale.iter().map(|name| self.storage.delete(name))).await?;
        let deleted: Vec<String> = stale
            .into_iter()
            .zip(removed)
            .filter_map(|(name, existed)| existed.then_some(name))
            .collect();

        for name in &deleted {
            info!(cache = %name, "Deleted stale cache");
        }

        self.host.claim_clients().await;
        Ok(deleted)
    }

    /// Answer an intercepted request.
    pub async fn fetch(&self, request: Request) -> FetchOutcome {
        match Strategy::for_request(&request, &self.config) {
            None => {
                debug!(method = %request.method, url = %request.url, "Passing through");
                FetchOutcome::PassThrough
            }
            Some(Strategy::NetworkFirst) => self.network_first(request).await,
            Some(Strategy::CacheFirst) => self.cache_first(request).await,
        }
    }

    async fn network_first(&self, request: Request) -> FetchOutcome {
        match self.network.fetch(&request).await {
            Ok(response) => {
                if response.ok() {
                    self.store(&request, response.clone()).await;
                }
                FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                    refresh: None,
                }
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed, trying cache");
                match self.lookup(&request).await {
                    Some(response) => FetchOutcome::Respond {
                        response,
                        source: ResponseSource::Cache,
                        refresh: None,
                    },
                    None => FetchOutcome::NoResponse(e),
                }
            }
        }
    }

    async fn cache_first(&self, request: Request) -> FetchOutcome {
        if let Some(response) = self.lookup(&request).await {
            let router = self.clone();
            let refresh = tokio::spawn(async move { router.refresh(request).await });
            return FetchOutcome::Respond {
                response,
                source: ResponseSource::Cache,
                refresh: Some(refresh),
            };
        }

        match self.network.fetch(&request).await {
            Ok(response) => {
                if response.ok() && self.may_cache_on_miss(&request) {
                    self.store(&request, response.clone()).await;
                }
                FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                    refresh: None,
                }
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed with no cached copy");
                FetchOutcome::NoResponse(e)
            }
        }
    }

    /// Background refresh for a cache hit. Every failure is swallowed.
    async fn refresh(&self, request: Request) {
        match self.network.fetch(&request).await {
            Ok(response) if response.ok() => {
                self.store(&request, response.clone()).await;
                debug!(url = %request.url, "Refreshed cached entry");
            }
            Ok(response) => {
                debug!(url = %request.url, status = %response.status, "Refresh returned non-success");
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Background refresh failed");
            }
        }
    }

    /// Same-origin requests and listed external assets are cached on a miss.
    fn may_cache_on_miss(&self, request: &Request) -> bool {
        self.config.is_same_origin(&request.url) || self.config.is_external_asset(&request.url)
    }

    async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.storage.match_any(request).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    async fn store(&self, request: &Request, response: Response) {
        let result = match self.storage.open(&self.config.cache_name).await {
            Ok(cache) => cache.put(request, response).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(url = %request.url, error = %e, "Ignoring cache write failure");
        }
    }

    /// Handle a message posted by a page. Returns whether it was recognised.
    pub async fn message(&self, payload: &serde_json::Value) -> bool {
        if payload.as_str() == Some(SKIP_WAITING_MESSAGE) {
            info!("skipWaiting requested by client");
            self.host.skip_waiting().await;
            true
        } else {
            debug!(payload = %payload, "Ignoring message");
            false
        }
    }
}
