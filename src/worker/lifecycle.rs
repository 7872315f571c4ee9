//! Worker lifecycle state and the host capabilities the router calls into.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

/// Lifecycle states of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Registered, install not yet started.
    Parsed,
    Installing,
    /// Installed and waiting for the previous version to let go.
    Installed,
    Activating,
    /// Active and intercepting fetches.
    Activated,
    /// Failed to install or replaced.
    Redundant,
}

impl WorkerState {
    /// Only an active worker intercepts fetches.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Platform operations the router may request.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Activate this version as soon as it is installed, without waiting
    /// for clients of the previous version to close.
    async fn skip_waiting(&self);

    /// Take control of every open client page.
    async fn claim_clients(&self);
}

/// Local registration: tracks one worker version's state.
pub struct Registration {
    state: watch::Sender<WorkerState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,

    /// Whether an older version is still controlling clients.
    previous_active: bool,
}

impl Registration {
    /// `previous_active` is true when an older version is still in control,
    /// in which case an installed worker waits unless told to skip waiting.
    pub fn new(previous_active: bool) -> Self {
        let (state, _) = watch::channel(WorkerState::Parsed);
        Self {
            state,
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
            previous_active,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    /// Whether an installed worker should move on to activation now.
    pub fn ready_to_activate(&self) -> bool {
        self.state() == WorkerState::Installed
            && (!self.previous_active || self.skip_waiting_requested())
    }

    /// Move to `next`, notifying subscribers.
    pub fn transition(&self, next: WorkerState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            info!(from = %prev, to = %next, "Worker state changed");
        }
    }
}

#[async_trait]
impl WorkerHost for Registration {
    async fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    async fn claim_clients(&self) {
        self.clients_claimed.store(true, Ordering::SeqCst);
    }
}
