//! Wire types for the coordination backend's HTTP API
//!
//! Field names follow the backend's PascalCase JSON. Response types default
//! every field so that a partial payload decodes and the caller decides which
//! absences matter.

use serde::{Deserialize, Serialize};

// ============================================================================
// Agent Service Types
// ============================================================================

/// Body of `PUT /agent/service/register`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub check: AgentCheck,
}

/// HTTP health check attached to a registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentCheck {
    #[serde(rename = "HTTP")]
    pub http: String,

    /// Backend duration string, e.g. `"10s"`
    pub interval: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deregister_critical_service_after: Option<String>,
}

/// Body of `GET /agent/service/{id}`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AgentService {
    #[serde(rename = "ID")]
    pub id: Option<String>,
    pub service: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub tags: Option<Vec<String>>,
}

// ============================================================================
// Session Types
// ============================================================================

/// Body of `PUT /session/create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionCreateRequest {
    pub name: String,

    /// `release` or `delete`; what happens to held locks when the session ends
    pub behavior: String,

    #[serde(rename = "TTL", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_delay: Option<String>,
}

/// Body returned by `PUT /session/create`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SessionCreateResponse {
    #[serde(rename = "ID")]
    pub id: Option<String>,
}

// ============================================================================
// KV Types
// ============================================================================

/// One element of the array returned by `GET /kv/{key}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KvEntry {
    pub key: String,
    pub session: Option<String>,

    /// Base64 encoded value as stored by the backend
    pub value: Option<String>,
    pub lock_index: u64,
    pub modify_index: u64,
}

/// Format a duration as a backend duration string (`"10s"`)
pub fn duration_string(duration: std::time::Duration) -> String {
    format!("{}s", duration.as_secs())
}
