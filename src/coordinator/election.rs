//! Leader election over a session-held KV lock
//!
//! The leader of service `name` is whichever session holds
//! `service/{name}/leader`. The backend's compare-and-set on `?acquire=`
//! guarantees at most one holder; nothing here takes a local lock.

use reqwest::StatusCode;

use crate::backend::models::KvEntry;
use crate::backend::BackendClient;
use crate::error::{Error, Result};
use crate::metrics;

use super::session::SessionId;

/// KV key holding the leader lock of a service
pub fn leader_key(service: &str) -> String {
    format!("service/{service}/leader")
}

// ============================================================================
// Leader Status
// ============================================================================

/// Outcome of an acquisition attempt
#[derive(Debug, Clone)]
pub enum LeaderStatus {
    /// This session now holds (or already held) the lock
    Acquired,

    /// Another session holds the lock
    HeldByOther,

    /// The attempt failed; leadership is unknown
    Error(Error),
}

impl LeaderStatus {
    /// Whether this status means the caller is leader
    pub fn is_leader(&self) -> bool {
        matches!(self, Self::Acquired)
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Acquired => "acquired",
            Self::HeldByOther => "held_by_other",
            Self::Error(_) => "error",
        }
    }
}

/// Interpret the response to `PUT /kv/{key}?acquire=`
///
/// Only a 2xx status with a body of exactly `true` is leadership, and only
/// 2xx with exactly `false` is a definite "someone else". Surrounding
/// whitespace is ignored; anything else is an error.
pub fn parse_acquire_response(status: StatusCode, body: &str) -> LeaderStatus {
    if !status.is_success() {
        return LeaderStatus::Error(Error::status(
            status.as_u16(),
            format!("lock acquire rejected: {}", body.trim()),
        ));
    }

    match body.trim() {
        "true" => LeaderStatus::Acquired,
        "false" => LeaderStatus::HeldByOther,
        other => LeaderStatus::Error(Error::malformed(format!(
            "unexpected lock acquire body: {other:?}"
        ))),
    }
}

// ============================================================================
// Leader Elector
// ============================================================================

/// Acquires and releases leader keys
#[derive(Debug, Clone)]
pub struct LeaderElector {
    client: BackendClient,
    payload: String,
}

impl LeaderElector {
    /// Create an elector; `payload` is stored as the key's value while held
    pub fn new(client: BackendClient, payload: impl Into<String>) -> Self {
        Self {
            client,
            payload: payload.into(),
        }
    }

    /// Try to take the leader key of `service` for `session`
    pub async fn acquire(&self, service: &str, session: &SessionId) -> LeaderStatus {
        let key = leader_key(service);
        let status = match self
            .client
            .put(
                "kv_acquire",
                &format!("kv/{key}"),
                &[("acquire", session.as_str())],
                Some(self.payload.clone()),
            )
            .await
        {
            Ok(response) => parse_acquire_response(response.status, &response.body),
            Err(e) => LeaderStatus::Error(e),
        };

        match &status {
            LeaderStatus::Acquired => {
                tracing::info!(service = %service, session = %session, "Acquired leadership");
                metrics::set_leader(service, true);
            }
            LeaderStatus::HeldByOther => {
                tracing::info!(service = %service, session = %session, "Leadership held by another session");
                metrics::set_leader(service, false);
            }
            LeaderStatus::Error(e) => {
                tracing::warn!(service = %service, session = %session, error = %e, "Leadership acquisition failed");
            }
        }

        status
    }

    /// Give up the leader key of `service` if `session` holds it
    ///
    /// Best effort: failures are logged, releasing an unheld key is harmless.
    pub async fn release(&self, service: &str, session: &SessionId) {
        let key = leader_key(service);
        let result = self
            .client
            .put(
                "kv_release",
                &format!("kv/{key}"),
                &[("release", session.as_str())],
                Some(self.payload.clone()),
            )
            .await
            .and_then(|r| r.error_for_status("lock release"));

        metrics::set_leader(service, false);

        match result {
            Ok(response) if response.body.trim() == "true" => {
                tracing::info!(service = %service, session = %session, "Released leadership");
            }
            Ok(_) => {
                tracing::debug!(service = %service, session = %session, "Lock was not held by this session");
            }
            Err(e) => {
                tracing::warn!(service = %service, session = %session, error = %e, "Failed to release leadership");
            }
        }
    }

    /// Session currently holding the leader key of `service`
    ///
    /// An absent key, an empty result or an entry without a session is `None`.
    pub async fn current_holder(&self, service: &str) -> Result<Option<SessionId>> {
        let key = leader_key(service);
        let response = self.client.get("kv_get", &format!("kv/{key}")).await?;

        let response = match response.error_for_status("leader key") {
            Ok(response) => response,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let entries: Vec<KvEntry> = response.json()?;
        Ok(entries
            .into_iter()
            .next()
            .and_then(|entry| entry.session)
            .and_then(SessionId::new))
    }
}

// ============================================================================
// Tests
// ============================================================================
