//! Common test utilities
//!
//! [`FakeBackend`] is an in-process coordination backend speaking the subset
//! of the agent, session and KV HTTP API the crate uses, including the
//! compare-and-set semantics of `?acquire=` and `?release=`.

#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use consort::backend::BackendClient;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

// ============================================================================
// Fake Backend State
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct KvRecord {
    pub value: String,
    pub session: Option<String>,
    pub lock_index: u64,
    pub modify_index: u64,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub services: HashMap<String, Value>,
    pub sessions: HashSet<String>,
    pub kv: HashMap<String, KvRecord>,
    index: u64,
}

impl FakeState {
    fn next_index(&mut self) -> u64 {
        self.index += 1;
        self.index
    }

    fn release_all(&mut self, session: &str) {
        let index = self.next_index();
        for record in self.kv.values_mut() {
            if record.session.as_deref() == Some(session) {
                record.session = None;
                record.modify_index = index;
            }
        }
    }
}

type Shared = Arc<Mutex<FakeState>>;

// ============================================================================
// Fake Backend
// ============================================================================

/// Running fake backend bound to a random local port
pub struct FakeBackend {
    pub base_url: String,
    state: Shared,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(FakeState::default()));

        let router = Router::new()
            .route("/v1/agent/service/register", put(register))
            .route("/v1/agent/service/deregister/{id}", put(deregister))
            .route("/v1/agent/service/{id}", get(service))
            .route("/v1/session/create", put(session_create))
            .route("/v1/session/destroy/{id}", put(session_destroy))
            .route("/v1/kv/{*key}", get(kv_get).put(kv_put))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/v1"),
            state,
        }
    }

    /// Client with a short timeout pointed at this backend
    pub fn client(&self) -> BackendClient {
        BackendClient::with_timeout(&self.base_url, Duration::from_secs(2)).unwrap()
    }

    /// Session currently holding `key`
    pub fn holder(&self, key: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .kv
            .get(key)
            .and_then(|r| r.session.clone())
    }

    pub fn has_service(&self, id: &str) -> bool {
        self.state.lock().unwrap().services.contains_key(id)
    }

    pub fn service_payload(&self, id: &str) -> Option<Value> {
        self.state.lock().unwrap().services.get(id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    /// Simulate a session expiring: it disappears and its locks are released
    pub fn expire_session(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.sessions.remove(id);
        state.release_all(id);
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn register(State(state): State<Shared>, Json(payload): Json<Value>) -> Response {
    let Some(id) = payload["ID"].as_str().map(String::from) else {
        return (StatusCode::BAD_REQUEST, "missing ID").into_response();
    };
    state.lock().unwrap().services.insert(id, payload);
    StatusCode::OK.into_response()
}

async fn deregister(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    match state.lock().unwrap().services.remove(&id) {
        Some(_) => StatusCode::OK.into_response(),
        None => (StatusCode::NOT_FOUND, format!("Unknown service ID {id:?}")).into_response(),
    }
}

async fn service(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    match state.lock().unwrap().services.get(&id) {
        Some(payload) => Json(json!({
            "ID": payload["ID"],
            "Service": payload["Name"],
            "Address": payload["Address"],
            "Port": payload["Port"],
            "Tags": payload["Tags"],
        }))
        .into_response(),
        None => (StatusCode::NOT_FOUND, "unknown service ID").into_response(),
    }
}

async fn session_create(State(state): State<Shared>, Json(_payload): Json<Value>) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    state.lock().unwrap().sessions.insert(id.clone());
    Json(json!({ "ID": id })).into_response()
}

async fn session_destroy(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    let mut state = state.lock().unwrap();
    state.sessions.remove(&id);
    state.release_all(&id);
    "true".into_response()
}

async fn kv_get(State(state): State<Shared>, Path(key): Path<String>) -> Response {
    match state.lock().unwrap().kv.get(&key) {
        Some(record) => Json(json!([{
            "Key": key,
            "Session": record.session,
            "Value": record.value,
            "LockIndex": record.lock_index,
            "ModifyIndex": record.modify_index,
            "Flags": 0,
        }]))
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn kv_put(
    State(state): State<Shared>,
    Path(key): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> Response {
    let mut state = state.lock().unwrap();
    let index = state.next_index();

    if let Some(session) = query.get("acquire") {
        if !state.sessions.contains(session) {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("invalid session {session:?}"),
            )
                .into_response();
        }

        let record = state.kv.entry(key).or_default();
        return match record.session.clone() {
            Some(holder) if holder != *session => "false".into_response(),
            Some(_) => {
                record.value = body;
                record.modify_index = index;
                "true".into_response()
            }
            None => {
                record.session = Some(session.clone());
                record.value = body;
                record.lock_index += 1;
                record.modify_index = index;
                "true".into_response()
            }
        };
    }

    if let Some(session) = query.get("release") {
        let Some(record) = state.kv.get_mut(&key) else {
            return "false".into_response();
        };
        return if record.session.as_deref() == Some(session.as_str()) {
            record.session = None;
            record.modify_index = index;
            "true".into_response()
        } else {
            "false".into_response()
        };
    }

    let record = state.kv.entry(key).or_default();
    record.value = body;
    record.modify_index = index;
    "true".into_response()
}
