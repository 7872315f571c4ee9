//! The caching worker.
//!
//! - [`router`]: install/activate/fetch/message handlers
//! - [`strategy`]: network-first vs cache-first selection
//! - [`lifecycle`]: worker states and host capabilities
//! - [`service`]: lifecycle driver around the router

pub mod lifecycle;
pub mod router;
pub mod service;
pub mod strategy;
