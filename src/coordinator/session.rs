//! Backend sessions
//!
//! A session is the identity that holds locks. Locks held by a session are
//! released when it is destroyed or expires.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::backend::models::{duration_string, SessionCreateRequest, SessionCreateResponse};
use crate::backend::BackendClient;
use crate::config::ElectionConfig;
use crate::error::{Error, Result};

// ============================================================================
// Session Id
// ============================================================================

/// Opaque, non-empty session token issued by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a backend session token; `None` for an empty string
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Borrow the raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value).ok_or_else(|| Error::not_found("session id"))
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

// ============================================================================
// Session Manager
// ============================================================================

/// Release locks when the session ends rather than deleting the keys
const BEHAVIOR_RELEASE: &str = "release";

/// Creates and destroys backend sessions
#[derive(Debug, Clone)]
pub struct SessionManager {
    client: BackendClient,
    ttl: Option<Duration>,
    lock_delay: Option<Duration>,
}

impl SessionManager {
    /// Create a session manager without TTL or lock delay
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            ttl: None,
            lock_delay: None,
        }
    }

    /// Create a session manager using the election configuration
    pub fn from_config(client: BackendClient, config: &ElectionConfig) -> Self {
        Self {
            client,
            ttl: config.session_ttl_secs.map(Duration::from_secs),
            lock_delay: config.lock_delay_secs.map(Duration::from_secs),
        }
    }

    /// Set the session TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Create a new session named `name`
    ///
    /// Single attempt. A response without a usable `ID` is `NotFound`.
    pub async fn create(&self, name: &str) -> Result<SessionId> {
        let request = SessionCreateRequest {
            name: name.to_string(),
            behavior: BEHAVIOR_RELEASE.to_string(),
            ttl: self.ttl.map(duration_string),
            lock_delay: self.lock_delay.map(duration_string),
        };

        let response = self
            .client
            .put_json("session_create", "session/create", &request)
            .await?
            .error_for_status("session create")?;

        let body: SessionCreateResponse = response.json()?;
        let id = body
            .id
            .and_then(SessionId::new)
            .ok_or_else(|| Error::not_found("session id in create response"))?;

        tracing::info!(session = %id, name = %name, "Session created");
        Ok(id)
    }

    /// Destroy a session, releasing every lock it holds
    ///
    /// Best effort: failures are logged and otherwise ignored.
    pub async fn destroy(&self, id: &SessionId) {
        let result = self
            .client
            .put(
                "session_destroy",
                &format!("session/destroy/{id}"),
                &[],
                None,
            )
            .await
            .and_then(|r| r.error_for_status("session destroy"));

        match result {
            Ok(_) => tracing::info!(session = %id, "Session destroyed"),
            Err(e) => tracing::warn!(session = %id, error = %e, "Failed to destroy session"),
        }
    }
}
