//! End-to-end tests over real sockets: client → gateway → mock upstream.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;
use tokio::sync::mpsc;

use resilient_gateway::config::FallbackConfig;

mod common;
use common::{base_config, client, route, start_gateway, start_mock_backend, start_programmable_backend, API_KEY};

/// An address nothing listens on.
async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn error_code(response: reqwest::Response) -> String {
    let body: Value = response.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn missing_api_key_is_401_with_trace_id() {
    let backend = start_mock_backend("secret").await;
    let mut config = base_config();
    config.routes.push(route("users", "/users/", backend));
    let (gateway, shutdown) = start_gateway(config).await;

    let response = client().get(format!("http://{gateway}/users/1")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(error_code(response).await, "unauthorized");
    shutdown.trigger();
}

#[tokio::test]
async fn forwards_with_prefix_stripped_and_trace_propagated() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let backend = start_programmable_backend(move |seen| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(seen);
            (200, r#"{"id":42}"#.to_string())
        }
    })
    .await;
    let mut config = base_config();
    config.forwarder.identity_headers.insert("X-Service-Identity".into(), "gateway".into());
    config.routes.push(route("users", "/users/", backend));
    let (gateway, shutdown) = start_gateway(config).await;

    let response = client()
        .get(format!("http://{gateway}/users/42?expand=orders"))
        .header("X-API-Key", API_KEY)
        .header("X-Request-ID", "trace-abc-123")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "trace-abc-123");
    assert_eq!(response.text().await.unwrap(), r#"{"id":42}"#);

    let seen = rx.recv().await.unwrap();
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.target, "/42?expand=orders");
    assert_eq!(seen.headers["x-request-id"], "trace-abc-123");
    assert_eq!(seen.headers["x-service-identity"], "gateway");
    assert_eq!(seen.headers["x-forwarded-for"], "127.0.0.1");
    assert!(!seen.headers.contains_key("x-api-key"));
    shutdown.trigger();
}

#[tokio::test]
async fn longest_prefix_wins() {
    let v1 = start_mock_backend("v1").await;
    let v2 = start_mock_backend("v2").await;
    let mut config = base_config();
    config.rate_limit.enabled = false;
    config.routes.push(route("api", "/api/", v1));
    config.routes.push(route("api-v2", "/api/v2/", v2));
    let (gateway, shutdown) = start_gateway(config).await;
    let client = client();

    let body = |path: &'static str| {
        let client = client.clone();
        async move {
            client
                .get(format!("http://{gateway}{path}"))
                .header("X-API-Key", API_KEY)
                .send()
                .await
                .unwrap()
                .text()
                .await
                .unwrap()
        }
    };

    assert_eq!(body("/api/v2/orders").await, "v2");
    assert_eq!(body("/api/v1/orders").await, "v1");
    assert_eq!(body("/api/orders").await, "v1");
    shutdown.trigger();
}

#[tokio::test]
async fn rate_limit_rejects_excess_requests() {
    let backend = start_mock_backend("ok").await;
    let mut config = base_config();
    config.rate_limit.capacity = 2;
    config.routes.push(route("users", "/users/", backend));
    let (gateway, shutdown) = start_gateway(config).await;
    let client = client();

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let response = client
            .get(format!("http://{gateway}/users/1"))
            .header("X-API-Key", API_KEY)
            .header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
            .send()
            .await
            .unwrap();
        statuses.push(response.status());
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            assert_eq!(error_code(response).await, "rate_limit_exceeded");
        }
    }
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]);

    // A different forwarded client has its own budget.
    let response = client
        .get(format!("http://{gateway}/users/1"))
        .header("X-API-Key", API_KEY)
        .header("X-Forwarded-For", "203.0.113.10")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    shutdown.trigger();
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let backend = start_programmable_backend(move |_| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, "busy".to_string())
            } else {
                (200, "done".to_string())
            }
        }
    })
    .await;
    let mut config = base_config();
    config.routes.push(route("jobs", "/jobs/", backend));
    let (gateway, shutdown) = start_gateway(config).await;

    let response = client()
        .get(format!("http://{gateway}/jobs/7"))
        .header("X-API-Key", API_KEY)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "done");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    shutdown.trigger();
}

#[tokio::test]
async fn unreachable_upstream_is_502() {
    let mut config = base_config();
    config.routes.push(route("ghost", "/ghost/", closed_port().await));
    let (gateway, shutdown) = start_gateway(config).await;

    let response = client()
        .get(format!("http://{gateway}/ghost/1"))
        .header("X-API-Key", API_KEY)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(response).await, "upstream_timeout_or_unreachable");
    shutdown.trigger();
}

#[tokio::test]
async fn slow_upstream_is_cut_off_by_per_try_timeout() {
    let backend = start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        (200, "late".to_string())
    })
    .await;
    let mut config = base_config();
    config.forwarder.per_try_timeout_ms = 100;
    config.forwarder.max_retries = 1;
    config.routes.push(route("slow", "/slow/", backend));
    let (gateway, shutdown) = start_gateway(config).await;

    let started = std::time::Instant::now();
    let response = client()
        .get(format!("http://{gateway}/slow/1"))
        .header("X-API-Key", API_KEY)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(started.elapsed() < Duration::from_secs(2));
    shutdown.trigger();
}

#[tokio::test]
async fn open_circuit_serves_fallback_without_calling_upstream() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let backend = start_programmable_backend(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { (500, "down".to_string()) }
    })
    .await;
    let mut config = base_config();
    config.rate_limit.enabled = false;
    config.breaker.failure_threshold = 2;
    config.forwarder.max_retries = 0;
    let mut catalog = route("catalog", "/catalog/", backend);
    catalog.fallback = Some(FallbackConfig {
        status: 200,
        body: r#"{"items":[],"degraded":true}"#.into(),
    });
    config.routes.push(catalog);
    let (gateway, shutdown) = start_gateway(config).await;
    let client = client();

    for _ in 0..2 {
        let response = client
            .get(format!("http://{gateway}/catalog/items"))
            .header("X-API-Key", API_KEY)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    let response = client
        .get(format!("http://{gateway}/catalog/items"))
        .header("X-API-Key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-gateway-fallback"], "true");
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), r#"{"items":[],"degraded":true}"#);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    shutdown.trigger();
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (gateway, shutdown) = start_gateway(base_config()).await;

    let response = client()
        .get(format!("http://{gateway}/nowhere"))
        .header("X-API-Key", API_KEY)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, "not_found");
    shutdown.trigger();
}

#[tokio::test]
async fn oversized_upstream_response_is_502_and_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let backend = start_programmable_backend(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { (200, "y".repeat(64)) }
    })
    .await;
    let mut config = base_config();
    config.security.max_body_size = 16;
    config.routes.push(route("exports", "/exports/", backend));
    let (gateway, shutdown) = start_gateway(config).await;

    let response = client()
        .get(format!("http://{gateway}/exports/all"))
        .header("X-API-Key", API_KEY)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(response).await, "upstream_response_too_large");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    shutdown.trigger();
}
