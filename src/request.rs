//! Request and response types exchanged between the router, the cache store
//! and the network.
//!
//! A [`Response`] body is a ref-counted [`Bytes`] buffer, so cloning a
//! response to both store and return it never re-reads the body.

use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

/// How a request treats cross-origin targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMode {
    /// Plain request, as issued by a page.
    #[default]
    NoCors,
    /// Cross-origin request that expects CORS headers.
    Cors,
    /// Top-level navigation.
    Navigate,
}

/// An outgoing request intercepted from a controlled page.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub mode: FetchMode,

    /// Request body; empty for GET.
    pub body: Bytes,
}

impl Request {
    /// Build a request with an explicit method.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            mode: FetchMode::default(),
            body: Bytes::new(),
        }
    }

    /// Build a GET request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parse `url` and build a GET request.
    pub fn get_str(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::get(Url::parse(url)?))
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    /// The identity this request is cached under.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }

    /// Host name of the target URL, if any.
    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }
}

/// Cache identity of a request: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_string(),
            url: url.into(),
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A response as returned by the network or stored in a cache.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,

    /// Final URL after redirects, when known.
    pub url: Option<Url>,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            url: None,
        }
    }

    /// A 200 response with the given body.
    pub fn ok_with(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_strips_fragment() {
        let a = Request::get_str("https://example.com/index.html#top").unwrap();
        let b = Request::get_str("https://example.com/index.html").unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "GET https://example.com/index.html");
    }

    #[test]
    fn test_key_distinguishes_method() {
        let url = Url::parse("https://example.com/api").unwrap();
        let get = Request::new(Method::GET, url.clone());
        let post = Request::new(Method::POST, url);
        assert_ne!(get.key(), post.key());
    }

    #[test]
    fn test_response_ok_range() {
        assert!(Response::new(StatusCode::OK, "").ok());
        assert!(Response::new(StatusCode::NO_CONTENT, "").ok());
        assert!(!Response::new(StatusCode::NOT_MODIFIED, "").ok());
        assert!(!Response::new(StatusCode::NOT_FOUND, "").ok());
    }
}
