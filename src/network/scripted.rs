//! A network that answers from a table of canned responses.
//!
//! Unknown URLs get a 404. The network can be switched offline, in which
//! case every fetch fails with [`NetworkError::Offline`]. Every fetch,
//! failed or not, is appended to the log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use http::StatusCode;
use tracing::debug;

use crate::network::{Network, NetworkError};
use crate::request::{Request, Response};

enum Route {
    Respond(Response),
    Fail(NetworkError),
}

#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Route>>,
    offline: AtomicBool,
    log: Mutex<Vec<Request>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `response` from now on.
    pub fn respond(&self, url: &str, response: Response) -> &Self {
        self.lock_routes().insert(url.to_string(), Route::Respond(response));
        self
    }

    /// Answer `url` with a 200 carrying `body`.
    pub fn respond_ok(&self, url: &str, body: &'static str) -> &Self {
        self.respond(url, Response::ok_with(body))
    }

    /// Fail every fetch of `url` with `error`.
    pub fn fail(&self, url: &str, error: NetworkError) -> &Self {
        self.lock_routes().insert(url.to_string(), Route::Fail(error));
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// URLs fetched so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.requests().iter().map(|r| r.url.to_string()).collect()
    }

    /// Requests received so far, in order, with method and body.
    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// How many times `url` was fetched.
    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetched().iter().filter(|u| u.as_str() == url).count()
    }

    fn lock_routes(&self) -> std::sync::MutexGuard<'_, HashMap<String, Route>> {
        self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = request.url.as_str().to_string();
        if let Ok(mut log) = self.log.lock() {
            log.push(request.clone());
        }

        if self.offline.load(Ordering::SeqCst) {
            debug!(url, "Scripted network offline");
            return Err(NetworkError::Offline);
        }

        let outcome = {
            let routes = self.lock_routes();
            match routes.get(&url) {
                Some(Route::Respond(response)) => {
                    let mut response = response.clone();
                    response.url = Some(request.url.clone());
                    Ok(response)
                }
                Some(Route::Fail(error)) => Err(error.clone()),
                None => Ok(Response::new(StatusCode::NOT_FOUND, "not found")),
            }
        };
        outcome
    }
}
