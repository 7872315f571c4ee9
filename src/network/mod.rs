//! Outbound network access.
//!
//! - [`http_client`]: real fetches through reqwest
//! - [`scripted`]: canned responses for tests and offline runs
//!
//! A non-2xx status is a successful fetch; callers inspect
//! [`Response::ok`](crate::request::Response::ok). Only transport failures
//! are errors.

pub mod http_client;
pub mod scripted;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::request::Request;
use crate::request::Response;

#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Network unavailable")]
    Offline,

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// The platform fetch primitive.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// Shared handle to an injected network.
pub type SharedNetwork = Arc<dyn Network>;
