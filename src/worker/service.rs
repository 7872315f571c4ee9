//! Drives one worker version through its lifecycle and gates fetch
//! interception on the active state.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::network::SharedNetwork;
use crate::request::Request;
use crate::storage::{SharedStorage, StorageError};
use crate::worker::lifecycle::{Registration, WorkerState};
use crate::worker::router::{CacheRouter, FetchOutcome, InstallError, InstallReport};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Install failed: {0}")]
    Install(#[from] InstallError),

    #[error("Activate failed: {0}")]
    Activate(#[source] StorageError),
}

/// A registered worker version: the router plus its registration.
pub struct ServiceWorker {
    router: CacheRouter,
    registration: Arc<Registration>,
}

impl ServiceWorker {
    /// Register a worker. `previous_active` is true when an older version
    /// still controls clients.
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: SharedStorage,
        network: SharedNetwork,
        previous_active: bool,
    ) -> Self {
        let registration = Arc::new(Registration::new(previous_active));
        let router = CacheRouter::new(config, storage, network, registration.clone());
        Self {
            router,
            registration,
        }
    }

    pub fn router(&self) -> &CacheRouter {
        &self.router
    }

    pub fn registration(&self) -> &Arc<Registration> {
        &self.registration
    }

    pub fn state(&self) -> WorkerState {
        self.registration.state()
    }

    /// Run install to completion and, if nothing holds it back, activate.
    ///
    /// A failed install discards the current cache version so a later run
    /// installs again instead of resuming a partial cache.
    pub async fn start(&self) -> Result<InstallReport, WorkerError> {
        self.registration.transition(WorkerState::Installing);
        let report = match self.router.install().await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Install failed, worker is redundant");
                if let Err(discard) = self.router.discard_current().await {
                    warn!(error = %discard, "Failed to discard partial cache");
                }
                self.registration.transition(WorkerState::Redundant);
                return Err(e.into());
            }
        };
        self.registration.transition(WorkerState::Installed);

        self.activate_if_ready().await?;
        Ok(report)
    }

    /// Resume a version that finished installing and activating in an
    /// earlier run. No lifecycle events are replayed.
    pub fn resume(&self) {
        self.registration.transition(WorkerState::Activated);
    }

    /// Activate a waiting worker if it is allowed to. Returns whether it did.
    ///
    /// If activation fails the worker goes back to `Installed`, so a later
    /// call (or a `"skipWaiting"` message) retries.
    pub async fn activate_if_ready(&self) -> Result<bool, WorkerError> {
        if !self.registration.ready_to_activate() {
            info!("Worker installed and waiting");
            return Ok(false);
        }

        self.registration.transition(WorkerState::Activating);
        let deleted = match self.router.activate().await {
            Ok(deleted) => deleted,
            Err(e) => {
                error!(error = %e, "Activate failed, worker stays installed");
                self.registration.transition(WorkerState::Installed);
                return Err(WorkerError::Activate(e));
            }
        };
        self.registration.transition(WorkerState::Activated);
        info!(deleted = deleted.len(), "Worker activated");
        Ok(true)
    }

    /// Deliver a message from a page. A `"skipWaiting"` message activates a
    /// waiting worker right away.
    pub async fn post_message(&self, payload: &serde_json::Value) -> Result<bool, WorkerError> {
        let handled = self.router.message(payload).await;
        if handled && self.state() == WorkerState::Installed {
            self.activate_if_ready().await?;
        }
        Ok(handled)
    }

    /// Route a request. Until the worker is active every request passes through.
    pub async fn fetch(&self, request: Request) -> FetchOutcome {
        if !self.state().can_intercept_fetch() {
            return FetchOutcome::PassThrough;
        }
        self.router.fetch(request).await
    }
}
