//! Per-request strategy selection.

use http::Method;

use crate::config::WorkerConfig;
use crate::request::Request;

/// How a GET request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Live network first, cached copy only when the network fails.
    NetworkFirst,
    /// Cached copy first, refreshed in the background.
    CacheFirst,
}

impl Strategy {
    /// Pick the strategy for `request`, or `None` when the request is left
    /// to the platform untouched.
    pub fn for_request(request: &Request, config: &WorkerConfig) -> Option<Self> {
        if request.method != Method::GET {
            return None;
        }
        if request.host() == Some(config.audio_sample_host.as_str()) {
            Some(Strategy::NetworkFirst)
        } else {
            Some(Strategy::CacheFirst)
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::NetworkFirst => write!(f, "network-first"),
            Strategy::CacheFirst => write!(f, "cache-first"),
        }
    }
}
