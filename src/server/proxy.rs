//! Interception routes.
//!
//! - `/proxy?url=<absolute url>`: any URL, e.g. CDN libraries or audio samples
//! - anything else: the path is resolved against the worker's scope

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response as HttpResponse};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::request::{Request, Response};
use crate::server::AppState;
use crate::worker::router::{FetchOutcome, ResponseSource};

/// Header telling the client where an answer came from.
pub const SOURCE_HEADER: &str = "x-sw-source";

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: String,
}

pub async fn proxy_url(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<ProxyQuery>,
    body: Bytes,
) -> HttpResponse {
    match Url::parse(&query.url) {
        Ok(url) => handle(&state, method, url, headers, body).await,
        Err(e) => (StatusCode::BAD_REQUEST, format!("invalid url: {e}")).into_response(),
    }
}

pub async fn proxy_path(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .trim_start_matches('/');
    let scope = &state.worker.router().config().scope;

    match scope.join(path) {
        Ok(url) => handle(&state, method, url, headers, body).await,
        Err(e) => (StatusCode::BAD_REQUEST, format!("invalid path: {e}")).into_response(),
    }
}

async fn handle(
    state: &AppState,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    let request_id = Uuid::new_v4();
    let mut request = Request::new(method, url).with_body(body);
    request.headers = forwardable(headers);

    info!(
        request_id = %request_id,
        method = %request.method,
        url = %request.url,
        "Intercepted request"
    );

    match state.worker.fetch(request.clone()).await {
        FetchOutcome::Respond {
            response, source, ..
        } => {
            let label = match source {
                ResponseSource::Cache => "cache",
                ResponseSource::Network => "network",
            };
            to_http(response, label)
        }
        FetchOutcome::PassThrough => match state.network.fetch(&request).await {
            Ok(response) => to_http(response, "passthrough"),
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Pass-through fetch failed");
                (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
            }
        },
        FetchOutcome::NoResponse(e) => {
            warn!(request_id = %request_id, error = %e, "No response available");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Remove headers that only describe a single hop.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    headers.remove(header::CONNECTION);
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONTENT_LENGTH);
}

fn forwardable(mut headers: HeaderMap) -> HeaderMap {
    headers.remove(header::HOST);
    strip_hop_by_hop(&mut headers);
    headers
}

fn to_http(response: Response, source: &'static str) -> HttpResponse {
    let mut headers = response.headers;
    strip_hop_by_hop(&mut headers);
    headers.insert(SOURCE_HEADER, HeaderValue::from_static(source));
    (response.status, headers, response.body).into_response()
}
