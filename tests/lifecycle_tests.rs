//! Integration tests for the worker lifecycle driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use url::Url;

use piano_quiz_sw::config::{StorageConfig, WorkerConfig, CACHE_NAME};
use piano_quiz_sw::network::scripted::ScriptedNetwork;
use piano_quiz_sw::request::{Request, Response};
use piano_quiz_sw::storage::disk::DiskCacheStorage;
use piano_quiz_sw::storage::memory::MemoryCacheStorage;
use piano_quiz_sw::storage::{Cache, CacheStorage, SharedStorage, StorageError};
use piano_quiz_sw::worker::lifecycle::WorkerState;
use piano_quiz_sw::worker::router::{FetchOutcome, ResponseSource};
use piano_quiz_sw::worker::service::{ServiceWorker, WorkerError};

const ORIGIN: &str = "http://localhost:8000/";

fn app_network() -> Arc<ScriptedNetwork> {
    let network = Arc::new(ScriptedNetwork::new());
    network
        .respond_ok("http://localhost:8000/", "<html>root</html>")
        .respond_ok("http://localhost:8000/index.html", "<html>index</html>")
        .respond_ok("http://localhost:8000/manifest.json", "{}");
    network
}

fn worker(storage: SharedStorage, network: Arc<ScriptedNetwork>, previous_active: bool) -> ServiceWorker {
    let config = Arc::new(WorkerConfig::for_scope(Url::parse(ORIGIN).unwrap()));
    ServiceWorker::new(config, storage, network, previous_active)
}

#[tokio::test]
async fn test_first_worker_installs_and_activates() {
    let storage = MemoryCacheStorage::shared();
    let sw = worker(storage.clone(), app_network(), false);
    let mut states = sw.registration().subscribe();

    let report = sw.start().await.unwrap();
    assert_eq!(report.static_cached, 3);
    assert_eq!(sw.state(), WorkerState::Activated);
    assert!(sw.registration().clients_claimed());
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), WorkerState::Activated);
}

#[tokio::test]
async fn test_start_replaces_previous_version() {
    let storage = MemoryCacheStorage::shared();
    storage.open("piano-quiz-v0").await.unwrap();

    let sw = worker(storage.clone(), app_network(), true);
    sw.start().await.unwrap();

    // Install asked to skip waiting, so the old version does not hold it back.
    assert_eq!(sw.state(), WorkerState::Activated);
    assert_eq!(storage.keys().await.unwrap(), vec![CACHE_NAME]);
}

#[tokio::test]
async fn test_failed_install_makes_worker_redundant() {
    let storage = MemoryCacheStorage::shared();
    let network = app_network();
    network.set_offline(true);
    let sw = worker(storage, network, false);

    let err = sw.start().await.unwrap_err();
    assert!(matches!(err, WorkerError::Install(_)));
    assert_eq!(sw.state(), WorkerState::Redundant);

    let outcome = sw.fetch(Request::get_str("http://localhost:8000/").unwrap()).await;
    assert!(matches!(outcome, FetchOutcome::PassThrough));
}

#[tokio::test]
async fn test_fetch_passes_through_until_active() {
    let sw = worker(MemoryCacheStorage::shared(), app_network(), false);

    let outcome = sw.fetch(Request::get_str("http://localhost:8000/index.html").unwrap()).await;
    assert!(matches!(outcome, FetchOutcome::PassThrough));
}

#[tokio::test]
async fn test_skip_waiting_message_activates_waiting_worker() {
    let storage = MemoryCacheStorage::shared();
    storage.open("piano-quiz-v0").await.unwrap();
    let sw = worker(storage.clone(), app_network(), true);

    sw.registration().transition(WorkerState::Installed);
    assert!(!sw.activate_if_ready().await.unwrap());
    assert_eq!(sw.state(), WorkerState::Installed);

    let handled = sw.post_message(&json!("skipWaiting")).await.unwrap();
    assert!(handled);
    assert_eq!(sw.state(), WorkerState::Activated);
    assert!(sw.registration().clients_claimed());
    assert_eq!(storage.keys().await.unwrap(), Vec::<String>::new());
}

#[tokio::test]
async fn test_unrelated_message_leaves_worker_waiting() {
    let sw = worker(MemoryCacheStorage::shared(), app_network(), true);
    sw.registration().transition(WorkerState::Installed);

    let handled = sw.post_message(&json!({ "type": "ping" })).await.unwrap();
    assert!(!handled);
    assert_eq!(sw.state(), WorkerState::Installed);
}

#[tokio::test]
async fn test_disk_store_serves_offline_after_restart() {
    let tmp = TempDir::new().unwrap();
    let storage_config = StorageConfig {
        path: tmp.path().join("sw"),
        ..Default::default()
    };

    {
        let storage = DiskCacheStorage::shared(&storage_config).await.unwrap();
        let sw = worker(storage, app_network(), false);
        sw.start().await.unwrap();
    }

    let storage = DiskCacheStorage::shared(&storage_config).await.unwrap();
    assert!(storage.has(CACHE_NAME).await.unwrap());

    let network = app_network();
    network.set_offline(true);
    let sw = worker(storage, network, false);
    sw.resume();

    let outcome = sw
        .fetch(Request::get_str("http://localhost:8000/index.html").unwrap())
        .await;
    let FetchOutcome::Respond {
        response, source, ..
    } = outcome
    else {
        panic!("expected a cached response");
    };
    assert_eq!(source, ResponseSource::Cache);
    assert_eq!(response.body.as_ref(), b"<html>index</html>");
}

#[tokio::test]
async fn test_failed_install_is_reinstalled_after_restart() {
    let tmp = TempDir::new().unwrap();
    let storage_config = StorageConfig {
        path: tmp.path().join("sw"),
        ..Default::default()
    };

    {
        let storage = DiskCacheStorage::shared(&storage_config).await.unwrap();
        storage.open("piano-quiz-v0").await.unwrap();
        let network = app_network();
        network.set_offline(true);
        let sw = worker(storage, network, true);
        assert!(sw.start().await.is_err());
        assert_eq!(sw.state(), WorkerState::Redundant);
    }

    // The restart finds no usable install of the current version.
    let storage = DiskCacheStorage::shared(&storage_config).await.unwrap();
    assert_eq!(storage.keys().await.unwrap(), vec!["piano-quiz-v0"]);
    let sw = worker(storage.clone(), app_network(), true);
    assert!(!sw.router().is_installed().await.unwrap());

    sw.start().await.unwrap();
    assert_eq!(sw.state(), WorkerState::Activated);
    assert!(sw.router().is_installed().await.unwrap());
    assert_eq!(storage.keys().await.unwrap(), vec![CACHE_NAME]);
}

#[tokio::test]
async fn test_partial_cache_does_not_count_as_installed() {
    let storage = MemoryCacheStorage::shared();
    let cache = storage.open(CACHE_NAME).await.unwrap();
    cache
        .put(
            &Request::get_str("http://localhost:8000/").unwrap(),
            Response::ok_with("root"),
        )
        .await
        .unwrap();

    let sw = worker(storage, app_network(), false);
    assert!(!sw.router().is_installed().await.unwrap());
}

/// A memory store whose cache deletion can be made to fail.
struct FlakyDeleteStorage {
    inner: MemoryCacheStorage,
    fail_delete: AtomicBool,
}

#[async_trait]
impl CacheStorage for FlakyDeleteStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError> {
        self.inner.open(name).await
    }

    async fn get(&self, name: &str) -> Result<Option<Arc<dyn Cache>>, StorageError> {
        self.inner.get(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked").into());
        }
        self.inner.delete(name).await
    }
}

#[tokio::test]
async fn test_failed_activation_falls_back_to_installed() {
    let storage = Arc::new(FlakyDeleteStorage {
        inner: MemoryCacheStorage::new(),
        fail_delete: AtomicBool::new(true),
    });
    storage.open("piano-quiz-v0").await.unwrap();
    let sw = worker(storage.clone(), app_network(), true);

    let err = sw.start().await.unwrap_err();
    assert!(matches!(err, WorkerError::Activate(_)));
    assert_eq!(sw.state(), WorkerState::Installed);

    // A later attempt activates once the store cooperates.
    storage.fail_delete.store(false, Ordering::SeqCst);
    assert!(sw.activate_if_ready().await.unwrap());
    assert_eq!(sw.state(), WorkerState::Activated);
    assert_eq!(storage.keys().await.unwrap(), vec![CACHE_NAME]);
}
