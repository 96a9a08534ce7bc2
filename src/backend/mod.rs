//! Coordination backend access
//!
//! - `client`: HTTP client with timeout, ACL token and per-operation metrics
//! - `models`: JSON wire types for agent services, sessions and KV entries

pub mod client;
pub mod models;

pub use client::{BackendClient, BackendResponse};
pub use models::{AgentCheck, AgentService, KvEntry, ServiceRegistration, SessionCreateResponse};
