//! Session listing, removal, expiry and shutdown over real HTTP

mod common;

use std::time::Duration;

use common::client::{SseConnection, post_message};
use serde_json::{Value, json};
use tether_core::ReaperPolicy;
use tether_server::SessionListResponse;

#[tokio::test]
async fn list_sessions_shows_open_stream() {
    let (_state, addr) = common::create_test_server().await;
    let mut conn = SseConnection::open(addr, None).await;
    conn.next_event().await;

    let body: SessionListResponse = reqwest::get(format!("http://{}/api/sessions", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body.count, 1);
    assert_eq!(body.sessions[0].id.as_str(), conn.session_id);
    assert!(body.sessions[0].active);
    assert!(body.sessions[0].alive);
}

#[tokio::test]
async fn deleting_session_closes_its_stream() {
    let (state, addr) = common::create_test_server().await;
    let mut conn = SseConnection::open(addr, None).await;
    conn.next_event().await;
    let id = conn.session_id.clone();

    let response = reqwest::Client::new()
        .delete(format!("http://{}/api/sessions/{}", addr, id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    assert!(state.registry.is_empty());

    conn.wait_closed().await;

    let response = post_message(addr, &id, &json!({})).await;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["data"]["resumeHint"], json!("/sse"));
}

#[tokio::test]
async fn idle_sessions_are_reaped() {
    let config = tether_server::ServerConfig {
        reaper: ReaperPolicy::Expiring {
            ttl: Duration::from_millis(200),
            interval: Duration::from_millis(50),
        },
        ..common::test_config()
    };
    let (state, addr) = common::create_test_server_with_config(config).await;
    let mut conn = SseConnection::open(addr, None).await;
    conn.next_event().await;

    common::wait_until("idle session is reaped", || state.registry.is_empty()).await;
    conn.wait_closed().await;
}

#[tokio::test]
async fn never_policy_keeps_idle_sessions() {
    let config = tether_server::ServerConfig {
        reaper: ReaperPolicy::Never {
            interval: Duration::from_millis(50),
        },
        ..common::test_config()
    };
    let (state, addr) = common::create_test_server_with_config(config).await;
    let mut conn = SseConnection::open(addr, None).await;
    conn.next_event().await;
    drop(conn);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let (state, addr) = common::create_test_server().await;
    let mut conn = SseConnection::open(addr, None).await;
    conn.next_event().await;

    state.shutdown.cancel();
    conn.wait_closed().await;
}

#[tokio::test]
async fn health_reports_sessions() {
    let (_state, addr) = common::create_test_server().await;
    let mut conn = SseConnection::open(addr, None).await;
    conn.next_event().await;

    let body: Value = reqwest::get(format!("http://{}/api/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["sessions"], json!(1));
}
