//! Startup dependency discovery
//!
//! Blocks until every named dependency is resolvable through a
//! [`ServiceLookup`], polling at a fixed interval, or until shutdown.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::metrics;

use super::registry::ServiceInstance;

/// Anything that can resolve a service name and group tag to an instance
#[async_trait]
pub trait ServiceLookup: Send + Sync {
    /// Single lookup attempt; `None` when absent or on any failure
    ///
    /// `tag` selects the replica group; `None` looks up the untagged instance.
    async fn find(&self, name: &str, tag: Option<&str>) -> Option<ServiceInstance>;
}

#[async_trait]
impl<T: ServiceLookup + ?Sized> ServiceLookup for Arc<T> {
    async fn find(&self, name: &str, tag: Option<&str>) -> Option<ServiceInstance> {
        (**self).find(name, tag).await
    }
}

/// Waits for a set of dependencies to become discoverable
#[derive(Debug, Clone)]
pub struct DependencyDiscoverer<L> {
    lookup: L,
    group: String,
}

impl<L: ServiceLookup> DependencyDiscoverer<L> {
    /// Create a discoverer resolving dependencies in `group`
    pub fn new(lookup: L, group: impl Into<String>) -> Self {
        Self {
            lookup,
            group: group.into(),
        }
    }

    /// Resolve every name to its port
    ///
    /// The first round runs immediately; later rounds are `poll_interval`
    /// apart and only retry unresolved names. Cancellation at any point
    /// returns [`Error::Cancelled`], never a partial map.
    pub async fn await_all<S: AsRef<str>>(
        &self,
        names: &[S],
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, u16>> {
        let mut pending: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().to_string();
            if !pending.contains(&name) {
                pending.push(name);
            }
        }

        let mut resolved = HashMap::with_capacity(pending.len());
        let mut round = 0u32;

        while !pending.is_empty() {
            if round > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            round += 1;

            let found = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                found = self.lookup_round(&pending) => found,
            };

            for (name, port) in found {
                tracing::info!(dependency = %name, port = port, "Dependency discovered");
                pending.retain(|p| *p != name);
                resolved.insert(name, port);
            }

            if !pending.is_empty() {
                tracing::info!(
                    round = round,
                    pending = ?pending,
                    "Waiting for dependencies"
                );
            }
        }

        Ok(resolved)
    }

    fn tag(&self) -> Option<&str> {
        Some(self.group.as_str()).filter(|group| !group.is_empty())
    }

    async fn lookup_round(&self, pending: &[String]) -> Vec<(String, u16)> {
        let mut found = Vec::new();
        for name in pending {
            let instance = self.lookup.find(name, self.tag()).await;
            metrics::record_discovery_lookup(name, instance.is_some());
            if let Some(instance) = instance {
                found.push((name.clone(), instance.port));
            }
        }
        found
    }
}

// ============================================================================
// Tests
// ============================================================================
