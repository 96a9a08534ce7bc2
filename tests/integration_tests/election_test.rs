//! Leader election tests
//!
//! Run against the fake backend, which implements the session-held lock
//! compare-and-set the same way the real backend does.

use consort::coordinator::{leader_key, LeaderElector, LeaderStatus, SessionManager};
use std::sync::Arc;

use crate::common::FakeBackend;

#[tokio::test]
async fn test_only_one_session_acquires() {
    let backend = FakeBackend::start().await;
    let sessions = SessionManager::new(backend.client());
    let elector = LeaderElector::new(backend.client(), "forecaster_primary");

    let x = sessions.create("forecaster_primary").await.unwrap();
    let y = sessions.create("forecaster_backup").await.unwrap();

    assert!(matches!(elector.acquire("forecaster", &x).await, LeaderStatus::Acquired));
    assert!(matches!(elector.acquire("forecaster", &y).await, LeaderStatus::HeldByOther));
    assert_eq!(backend.holder(&leader_key("forecaster")).as_deref(), Some(x.as_str()));
}

#[tokio::test]
async fn test_release_hands_over_leadership() {
    let backend = FakeBackend::start().await;
    let sessions = SessionManager::new(backend.client());
    let elector = LeaderElector::new(backend.client(), "");

    let x = sessions.create("x").await.unwrap();
    let y = sessions.create("y").await.unwrap();

    assert!(elector.acquire("quotes", &x).await.is_leader());
    assert!(!elector.acquire("quotes", &y).await.is_leader());

    elector.release("quotes", &x).await;
    assert_eq!(elector.current_holder("quotes").await.unwrap(), None);

    assert!(elector.acquire("quotes", &y).await.is_leader());
    assert_eq!(elector.current_holder("quotes").await.unwrap(), Some(y));
}

#[tokio::test]
async fn test_reacquire_by_holder_is_idempotent() {
    let backend = FakeBackend::start().await;
    let sessions = SessionManager::new(backend.client());
    let elector = LeaderElector::new(backend.client(), "");

    let x = sessions.create("x").await.unwrap();
    assert!(elector.acquire("gateway", &x).await.is_leader());
    assert!(elector.acquire("gateway", &x).await.is_leader());
    assert_eq!(elector.current_holder("gateway").await.unwrap(), Some(x));
}

#[tokio::test]
async fn test_release_by_non_holder_keeps_lock() {
    let backend = FakeBackend::start().await;
    let sessions = SessionManager::new(backend.client());
    let elector = LeaderElector::new(backend.client(), "");

    let x = sessions.create("x").await.unwrap();
    let y = sessions.create("y").await.unwrap();

    assert!(elector.acquire("gateway", &x).await.is_leader());
    elector.release("gateway", &y).await;
    assert_eq!(elector.current_holder("gateway").await.unwrap(), Some(x));
}

#[tokio::test]
async fn test_destroying_session_frees_lock() {
    let backend = FakeBackend::start().await;
    let sessions = SessionManager::new(backend.client());
    let elector = LeaderElector::new(backend.client(), "");

    let x = sessions.create("x").await.unwrap();
    assert!(elector.acquire("pricereader", &x).await.is_leader());
    assert_eq!(backend.session_count(), 1);

    sessions.destroy(&x).await;
    assert_eq!(backend.session_count(), 0);
    assert_eq!(elector.current_holder("pricereader").await.unwrap(), None);
}

#[tokio::test]
async fn test_expired_session_cannot_acquire() {
    let backend = FakeBackend::start().await;
    let sessions = SessionManager::new(backend.client());
    let elector = LeaderElector::new(backend.client(), "");

    let x = sessions.create("x").await.unwrap();
    backend.expire_session(x.as_str());

    // The backend rejects acquisition with an unknown session
    assert!(matches!(elector.acquire("pricereader", &x).await, LeaderStatus::Error(_)));
    assert_eq!(elector.current_holder("pricereader").await.unwrap(), None);
}

#[tokio::test]
async fn test_concurrent_acquirers_elect_exactly_one() {
    let backend = FakeBackend::start().await;
    let sessions = SessionManager::new(backend.client());
    let elector = Arc::new(LeaderElector::new(backend.client(), ""));

    let mut ids = Vec::new();
    for i in 0..8 {
        ids.push(sessions.create(&format!("replica-{i}")).await.unwrap());
    }

    let mut handles = Vec::new();
    for id in ids {
        let elector = Arc::clone(&elector);
        handles.push(tokio::spawn(async move { elector.acquire("forecaster", &id).await }));
    }

    let mut leaders = 0;
    for handle in handles {
        if handle.await.unwrap().is_leader() {
            leaders += 1;
        }
    }
    assert_eq!(leaders, 1);
}

#[tokio::test]
async fn test_current_holder_of_unknown_key_is_none() {
    let backend = FakeBackend::start().await;
    let elector = LeaderElector::new(backend.client(), "");
    assert_eq!(elector.current_holder("nobody").await.unwrap(), None);
}
