//! piano-quiz-sw: offline caching worker for the piano note quiz.
//!
//! Intercepts the quiz application's GET requests and answers them from a
//! versioned response cache:
//!   audio samples → network first, cache as fallback
//!   everything else → cache first, refreshed in the background
//!
//! The app shell is pre-cached at install and stale cache versions are
//! dropped at activation. The [`server`] module hosts the worker behind a
//! local HTTP proxy.

pub mod config;
pub mod network;
pub mod request;
pub mod server;
pub mod storage;
pub mod worker;
