//! Integration tests for the HTTP host.

use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request as HttpRequest, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

use piano_quiz_sw::config::WorkerConfig;
use piano_quiz_sw::network::scripted::ScriptedNetwork;
use piano_quiz_sw::server::proxy::SOURCE_HEADER;
use piano_quiz_sw::server::{build_router, AppState};
use piano_quiz_sw::storage::memory::MemoryCacheStorage;
use piano_quiz_sw::worker::service::ServiceWorker;

async fn started_app() -> (Router, Arc<ScriptedNetwork>) {
    let network = Arc::new(ScriptedNetwork::new());
    network
        .respond_ok("http://localhost:8000/", "<html>root</html>")
        .respond_ok("http://localhost:8000/index.html", "<html>index</html>")
        .respond_ok("http://localhost:8000/manifest.json", "{}")
        .respond_ok("https://tonejs.github.io/audio.mp3", "pcm");

    let config = Arc::new(WorkerConfig::for_scope(Url::parse("http://localhost:8000/").unwrap()));
    let worker = ServiceWorker::new(config, MemoryCacheStorage::shared(), network.clone(), false);
    worker.start().await.unwrap();

    let state = Arc::new(AppState {
        worker,
        network: network.clone(),
        start_time: Instant::now(),
    });
    (build_router(state), network)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = started_app().await;
    let response = app
        .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["worker"], "activated");
}

#[tokio::test]
async fn test_status_reports_current_cache() {
    let (app, _) = started_app().await;
    let response = app
        .oneshot(HttpRequest::get("/sw/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["cache_name"], "piano-quiz-v1");
    assert_eq!(json["entries"], 3);
    assert_eq!(json["clients_claimed"], true);
}

#[tokio::test]
async fn test_app_shell_served_from_cache_offline() {
    let (app, network) = started_app().await;
    network.set_offline(true);

    let response = app
        .oneshot(HttpRequest::get("/index.html").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[SOURCE_HEADER], "cache");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"<html>index</html>");
}

#[tokio::test]
async fn test_proxy_route_uses_network_first_for_audio() {
    let (app, _) = started_app().await;
    let response = app
        .oneshot(
            HttpRequest::get("/proxy?url=https://tonejs.github.io/audio.mp3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[SOURCE_HEADER], "network");
}

#[tokio::test]
async fn test_post_passes_through() {
    let (app, network) = started_app().await;
    network.respond_ok("http://localhost:8000/score", "saved");

    let response = app
        .oneshot(
            HttpRequest::builder()
                .method(Method::POST)
                .uri("/score")
                .body(Body::from("42"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[SOURCE_HEADER], "passthrough");
}

#[tokio::test]
async fn test_post_to_proxy_route_passes_through_with_body() {
    let (app, network) = started_app().await;
    network.respond_ok("https://scores.example.com/submit", "stored");

    let response = app
        .oneshot(
            HttpRequest::builder()
                .method(Method::POST)
                .uri("/proxy?url=https://scores.example.com/submit")
                .body(Body::from(r#"{"score":42}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[SOURCE_HEADER], "passthrough");

    let sent = network.requests();
    let forwarded = sent
        .iter()
        .find(|r| r.url.as_str() == "https://scores.example.com/submit")
        .expect("request forwarded");
    assert_eq!(forwarded.method, Method::POST);
    assert_eq!(&forwarded.body[..], br#"{"score":42}"#);
}

#[tokio::test]
async fn test_offline_miss_is_bad_gateway() {
    let (app, network) = started_app().await;
    network.set_offline(true);

    let response = app
        .oneshot(HttpRequest::get("/not-cached").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_message_endpoint() {
    let (app, _) = started_app().await;
    let response = app
        .oneshot(
            HttpRequest::builder()
                .method(Method::POST)
                .uri("/sw/message")
                .header("content-type", "application/json")
                .body(Body::from(r#""skipWaiting""#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["handled"], true);
    assert_eq!(json["state"], "activated");
}
