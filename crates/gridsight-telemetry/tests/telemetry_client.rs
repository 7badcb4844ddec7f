//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "integration-test"
//! ems_type: "source"
//! ems_scope: "test"
//! ems_description: "Telemetry client behaviour against a stub channel server."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use gridsight_common::config::TelemetryConfig;
use gridsight_telemetry::TelemetryClient;
use serde_json::{json, Value};

async fn spawn_stub(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> TelemetryClient {
    TelemetryClient::new(&TelemetryConfig {
        base_url: format!("http://{addr}"),
        channel_id: "42".to_owned(),
        read_key: "test-key".to_owned(),
        history_results: 20,
    })
    .unwrap()
}

fn sample_feed(entry_id: u64, minute: u32) -> Value {
    json!({
        "created_at": format!("2026-08-01T10:{minute:02}:00Z"),
        "entry_id": entry_id,
        "field1": "1.50",
        "field2": format!("{}", 400 + entry_id),
        "field3": "30.00"
    })
}

#[tokio::test]
async fn last_feed_is_decoded() {
    let router = Router::new().route(
        "/channels/42/feeds/last.json",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            assert_eq!(params.get("api_key").map(String::as_str), Some("test-key"));
            Json(sample_feed(7, 5))
        }),
    );
    let client = client_for(spawn_stub(router).await);

    let feed = client.fetch_last().await.expect("feed should decode");
    assert_eq!(feed.entry_id, 7);
    assert_eq!(feed.current_amps(), 1.5);
    assert_eq!(feed.power_watts(), 407.0);
}

#[tokio::test]
async fn empty_body_yields_none() {
    // The channel signals "no data yet" with a JSON object missing
    // `created_at`; this must map to None, not an error.
    let router = Router::new().route(
        "/channels/42/feeds/last.json",
        get(|| async { Json(json!({})) }),
    );
    let client = client_for(spawn_stub(router).await);

    assert!(client.fetch_last().await.is_none());
}

#[tokio::test]
async fn server_error_yields_none() {
    let router = Router::new().route(
        "/channels/42/feeds/last.json",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let client = client_for(spawn_stub(router).await);

    assert!(client.fetch_last().await.is_none());
}

#[tokio::test]
async fn unreachable_endpoint_yields_none() {
    // Bind then drop the listener so the port is closed.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = client_for(addr);

    assert!(client.fetch_last().await.is_none());
    assert!(client.fetch_history(20).await.is_empty());
}

#[tokio::test]
async fn history_preserves_count_and_provider_order() {
    let router = Router::new().route(
        "/channels/42/feeds.json",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            assert_eq!(params.get("results").map(String::as_str), Some("5"));
            assert_eq!(params.get("api_key").map(String::as_str), Some("test-key"));
            Json(json!({
                "channel": { "id": 42, "name": "lab-meter" },
                "feeds": (0..5).map(|i| sample_feed(100 + i, i as u32)).collect::<Vec<_>>()
            }))
        }),
    );
    let client = client_for(spawn_stub(router).await);

    let feeds = client.fetch_history(5).await;
    assert_eq!(feeds.len(), 5);
    let ids: Vec<u64> = feeds.iter().map(|f| f.entry_id).collect();
    assert_eq!(ids, vec![100, 101, 102, 103, 104]);
}

#[tokio::test]
async fn history_failure_yields_empty() {
    let router = Router::new().route(
        "/channels/42/feeds.json",
        get(|| async { StatusCode::BAD_GATEWAY }),
    );
    let client = client_for(spawn_stub(router).await);

    assert!(client.fetch_history(20).await.is_empty());
}
