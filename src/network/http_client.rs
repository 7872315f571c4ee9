//! Network access over HTTP(S) via reqwest.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::NetworkConfig;
use crate::network::{Network, NetworkError};
use crate::request::{Request, Response};

/// Fetches requests from the real network.
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn new(config: &NetworkConfig) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }

    fn map_error(url: &str, e: reqwest::Error) -> NetworkError {
        if e.is_timeout() {
            NetworkError::Timeout {
                url: url.to_string(),
            }
        } else if e.is_builder() {
            NetworkError::InvalidRequest(e.to_string())
        } else {
            NetworkError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = request.url.as_str();
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| Self::map_error(url, e))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let final_url = resp.url().clone();
        let body = resp.bytes().await.map_err(|e| Self::map_error(url, e))?;

        debug!(
            url,
            status = %status,
            size = body.len(),
            mode = ?request.mode,
            "Fetched from network"
        );

        Ok(Response {
            status,
            headers,
            body,
            url: Some(final_url),
        })
    }
}
