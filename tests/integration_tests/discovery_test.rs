//! Dependency discovery tests

use async_trait::async_trait;
use consort::coordinator::{DependencyDiscoverer, ServiceInstance, ServiceLookup, ServiceRegistry};
use consort::backend::BackendClient;
use consort::error::Error;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::FakeBackend;

/// Misses a fixed number of times, then resolves every name to 16001
struct LateLookup {
    misses: u32,
    calls: AtomicU32,
}

#[async_trait]
impl ServiceLookup for LateLookup {
    async fn find(&self, name: &str, tag: Option<&str>) -> Option<ServiceInstance> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (call >= self.misses).then(|| {
            ServiceInstance::new(name, tag.unwrap_or_default(), "127.0.0.1", 16001, Duration::from_secs(10))
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_waits_one_interval_per_miss() {
    let lookup = Arc::new(LateLookup {
        misses: 3,
        calls: AtomicU32::new(0),
    });
    let discoverer = DependencyDiscoverer::new(Arc::clone(&lookup), "primary");
    let cancel = CancellationToken::new();

    let started = tokio::time::Instant::now();
    let resolved = discoverer
        .await_all(&["quotes"], Duration::from_secs(1), &cancel)
        .await
        .unwrap();

    assert_eq!(resolved.get("quotes"), Some(&16001));
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 4);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_resolves_registered_services() {
    let backend = FakeBackend::start().await;
    let registry = ServiceRegistry::new(backend.client());
    for (name, port) in [("quotes", 16001), ("forecaster", 16002)] {
        let instance = ServiceInstance::new(name, "primary", "127.0.0.1", port, Duration::from_secs(10));
        registry.register(&instance).await.unwrap();
    }

    let discoverer = DependencyDiscoverer::new(registry, "primary");
    let cancel = CancellationToken::new();
    let resolved = discoverer
        .await_all(&["quotes", "forecaster", "quotes"], Duration::from_millis(50), &cancel)
        .await
        .unwrap();

    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved["quotes"], 16001);
    assert_eq!(resolved["forecaster"], 16002);
}

#[tokio::test]
async fn test_retries_until_backend_reports_service() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/agent/service/quotes_primary"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/agent/service/quotes_primary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ID": "quotes_primary",
            "Service": "quotes",
            "Port": 16001
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        BackendClient::with_timeout(format!("{}/v1", server.uri()), Duration::from_secs(2)).unwrap();
    let discoverer = DependencyDiscoverer::new(ServiceRegistry::new(client), "primary");
    let cancel = CancellationToken::new();

    let resolved = discoverer
        .await_all(&["quotes"], Duration::from_millis(20), &cancel)
        .await
        .unwrap();
    assert_eq!(resolved["quotes"], 16001);
}

#[tokio::test]
async fn test_cancel_while_waiting() {
    let backend = FakeBackend::start().await;
    let discoverer = DependencyDiscoverer::new(ServiceRegistry::new(backend.client()), "primary");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let result = discoverer
        .await_all(&["never-registered"], Duration::from_millis(50), &cancel)
        .await;
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_empty_dependency_list_returns_immediately() {
    let backend = FakeBackend::start().await;
    let discoverer = DependencyDiscoverer::new(ServiceRegistry::new(backend.client()), "primary");
    let cancel = CancellationToken::new();

    let names: [&str; 0] = [];
    let resolved = discoverer
        .await_all(&names, Duration::from_secs(60), &cancel)
        .await
        .unwrap();
    assert!(resolved.is_empty());
}
