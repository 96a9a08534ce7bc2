//! Error scenario integration tests
//!
//! Tests how the coordination layer reacts to a misbehaving backend:
//! 1. Ambiguous or failed lock acquisition responses
//! 2. Malformed service lookups
//! 3. Session creation without an id
//! 4. Leader key reads that are empty, absent or garbage
//! 5. Timeouts and non-2xx statuses

use consort::backend::BackendClient;
use consort::coordinator::{LeaderElector, LeaderStatus, ServiceInstance, ServiceRegistry, SessionId, SessionManager};
use consort::error::Error;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> BackendClient {
    BackendClient::with_timeout(format!("{}/v1", server.uri()), Duration::from_secs(2)).unwrap()
}

fn session(id: &str) -> SessionId {
    SessionId::new(id).unwrap()
}

// ============================================================================
// Lock Acquisition
// ============================================================================

#[tokio::test]
async fn test_acquire_ambiguous_body_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/kv/service/forecaster/leader"))
        .and(query_param("acquire", "s1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("maybe"))
        .mount(&server)
        .await;

    let elector = LeaderElector::new(client(&server), "");
    let status = elector.acquire("forecaster", &session("s1")).await;
    assert!(matches!(status, LeaderStatus::Error(Error::Backend { status: None, .. })));
}

#[tokio::test]
async fn test_acquire_server_error_is_error_even_with_true_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/kv/service/forecaster/leader"))
        .respond_with(ResponseTemplate::new(500).set_body_string("true"))
        .mount(&server)
        .await;

    let elector = LeaderElector::new(client(&server), "");
    match elector.acquire("forecaster", &session("s1")).await {
        LeaderStatus::Error(Error::Backend { status, .. }) => assert_eq!(status, Some(500)),
        other => panic!("expected backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_acquire_timeout_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("true")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client =
        BackendClient::with_timeout(format!("{}/v1", server.uri()), Duration::from_millis(200))
            .unwrap();
    let elector = LeaderElector::new(client, "");
    let status = elector.acquire("forecaster", &session("s1")).await;
    assert!(matches!(status, LeaderStatus::Error(Error::BackendUnavailable(_))));
}

#[tokio::test]
async fn test_acquire_sends_payload_as_value() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/kv/service/gateway/leader"))
        .and(query_param("acquire", "s1"))
        .and(wiremock::matchers::body_string("gateway_primary"))
        .respond_with(ResponseTemplate::new(200).set_body_string("true"))
        .expect(1)
        .mount(&server)
        .await;

    let elector = LeaderElector::new(client(&server), "gateway_primary");
    assert!(elector.acquire("gateway", &session("s1")).await.is_leader());
}

// ============================================================================
// Service Lookup
// ============================================================================

#[tokio::test]
async fn test_find_malformed_json_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/service/quotes_primary"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let registry = ServiceRegistry::new(client(&server));
    assert!(registry.find("quotes", Some("primary")).await.is_none());
}

#[tokio::test]
async fn test_find_without_port_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/service/quotes_primary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ID": "quotes_primary",
            "Service": "quotes",
            "Address": "10.0.0.7"
        })))
        .mount(&server)
        .await;

    let registry = ServiceRegistry::new(client(&server));
    assert!(registry.find("quotes", Some("primary")).await.is_none());
}

#[tokio::test]
async fn test_find_server_error_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("agent down"))
        .mount(&server)
        .await;

    let registry = ServiceRegistry::new(client(&server));
    assert!(registry.find("quotes", Some("primary")).await.is_none());
}

#[tokio::test]
async fn test_find_uses_reported_address() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/service/quotes_primary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ID": "quotes_primary",
            "Service": "quotes",
            "Address": "10.0.0.7",
            "Port": 16001,
            "Tags": ["primary"]
        })))
        .mount(&server)
        .await;

    let registry = ServiceRegistry::new(client(&server));
    let instance = registry.find("quotes", Some("primary")).await.unwrap();
    assert_eq!(instance.address, "10.0.0.7");
    assert_eq!(instance.port, 16001);
    assert!(instance.health_check.is_none());
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_payload_shape() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .and(body_partial_json(json!({
            "ID": "forecaster_primary",
            "Name": "forecaster",
            "Port": 16000,
            "Tags": ["primary"],
            "Check": { "HTTP": "http://127.0.0.1:16000/health", "Interval": "10s" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let registry = ServiceRegistry::new(client(&server));
    let instance =
        ServiceInstance::new("forecaster", "primary", "127.0.0.1", 16000, Duration::from_secs(10));
    registry.register(&instance).await.unwrap();
}

#[tokio::test]
async fn test_register_rejected_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Invalid check"))
        .mount(&server)
        .await;

    let registry = ServiceRegistry::new(client(&server));
    let instance =
        ServiceInstance::new("forecaster", "primary", "127.0.0.1", 16000, Duration::from_secs(10));
    let err = registry.register(&instance).await.unwrap_err();
    assert!(matches!(err, Error::Backend { status: Some(400), .. }));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_deregister_server_error_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/deregister/quotes_primary"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let registry = ServiceRegistry::new(client(&server));
    let err = registry.deregister("quotes_primary").await.unwrap_err();
    assert!(matches!(err, Error::Backend { status: Some(500), .. }));
}

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test]
async fn test_session_create_without_id_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/session/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let sessions = SessionManager::new(client(&server));
    let err = sessions.create("x").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_session_create_with_empty_id_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/session/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ID": "" })))
        .mount(&server)
        .await;

    let sessions = SessionManager::new(client(&server));
    assert!(sessions.create("x").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_session_create_sends_release_behavior_and_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/session/create"))
        .and(body_partial_json(json!({
            "Name": "forecaster_primary",
            "Behavior": "release",
            "TTL": "30s"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ID": "adf4238a" })))
        .expect(1)
        .mount(&server)
        .await;

    let sessions = SessionManager::new(client(&server)).with_ttl(Duration::from_secs(30));
    let id = sessions.create("forecaster_primary").await.unwrap();
    assert_eq!(id.as_str(), "adf4238a");
}

// ============================================================================
// Leader Key Reads
// ============================================================================

#[tokio::test]
async fn test_current_holder_empty_array_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/service/quotes/leader"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;

    let elector = LeaderElector::new(client(&server), "");
    assert_eq!(elector.current_holder("quotes").await.unwrap(), None);
}

#[tokio::test]
async fn test_current_holder_without_session_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/service/quotes/leader"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "Key": "service/quotes/leader", "LockIndex": 3, "ModifyIndex": 40 }
        ])))
        .mount(&server)
        .await;

    let elector = LeaderElector::new(client(&server), "");
    assert_eq!(elector.current_holder("quotes").await.unwrap(), None);
}

#[tokio::test]
async fn test_current_holder_reads_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/service/quotes/leader"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "Key": "service/quotes/leader", "Session": "adf4238a", "LockIndex": 1 }
        ])))
        .mount(&server)
        .await;

    let elector = LeaderElector::new(client(&server), "");
    assert_eq!(
        elector.current_holder("quotes").await.unwrap(),
        Some(session("adf4238a"))
    );
}

#[tokio::test]
async fn test_current_holder_garbage_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let elector = LeaderElector::new(client(&server), "");
    assert!(elector.current_holder("quotes").await.is_err());
}
