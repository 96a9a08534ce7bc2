//! Service registry backed by the coordination backend's agent API
//!
//! This module advertises the local instance for discovery, removes it on
//! shutdown, and looks up other instances by name and group tag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::backend::models::{duration_string, AgentCheck, AgentService, ServiceRegistration};
use crate::backend::BackendClient;
use crate::config::ServiceConfig;
use crate::error::{Error, Result};

use super::discovery::ServiceLookup;

/// Path of the health endpoint the backend polls
pub const HEALTH_PATH: &str = "/health";

// ============================================================================
// Service Instance
// ============================================================================

/// HTTP health check the backend runs against an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Absolute URL of the health endpoint
    pub url: String,

    /// Fixed polling interval
    pub interval: Duration,

    /// Drop the registration after this long in critical state
    pub deregister_critical_after: Option<Duration>,
}

/// A registered (or discovered) service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Unique instance id: `{name}_{group}`
    pub id: String,

    /// Logical service name
    pub name: String,

    /// Address other instances use to reach it
    pub address: String,

    /// Listening port
    pub port: u16,

    /// Tags; the group is always one of them
    pub tags: BTreeSet<String>,

    /// Health check; the agent lookup does not report it for discovered instances
    pub health_check: Option<HealthCheck>,
}

impl ServiceInstance {
    /// Create an instance for `name` in `group`
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        check_interval: Duration,
    ) -> Self {
        let name = name.into();
        let group = group.into();
        let address = address.into();

        let mut tags = BTreeSet::new();
        if !group.is_empty() {
            tags.insert(group.clone());
        }

        Self {
            id: Self::instance_id(&name, &group),
            health_check: Some(HealthCheck {
                url: format!("http://{address}:{port}{HEALTH_PATH}"),
                interval: check_interval,
                deregister_critical_after: None,
            }),
            name,
            address,
            port,
            tags,
        }
    }

    /// Create the local instance from the service configuration
    pub fn from_config(config: &ServiceConfig) -> Self {
        let mut instance = Self::new(
            &config.name,
            &config.group,
            &config.address,
            config.port,
            Duration::from_secs(config.health_check_interval_secs),
        );
        if let Some(check) = instance.health_check.as_mut() {
            check.deregister_critical_after = config
                .deregister_critical_after_secs
                .map(Duration::from_secs);
        }
        instance
    }

    /// Derive the instance id from a name and group
    pub fn instance_id(name: &str, group: &str) -> String {
        if group.is_empty() {
            name.to_string()
        } else {
            format!("{name}_{group}")
        }
    }

    /// Build the registration payload
    pub fn to_registration(&self) -> ServiceRegistration {
        let check = self.health_check.clone().unwrap_or_else(|| HealthCheck {
            url: format!("http://{}:{}{HEALTH_PATH}", self.address, self.port),
            interval: Duration::from_secs(10),
            deregister_critical_after: None,
        });

        ServiceRegistration {
            id: self.id.clone(),
            name: self.name.clone(),
            address: self.address.clone(),
            port: self.port,
            tags: self.tags.iter().cloned().collect(),
            check: AgentCheck {
                http: check.url,
                interval: duration_string(check.interval),
                deregister_critical_service_after: check
                    .deregister_critical_after
                    .map(duration_string),
            },
        }
    }

    fn from_agent_service(service: AgentService, name: &str, tag: &str) -> Option<Self> {
        let id = service.id.filter(|id| !id.is_empty())?;
        let port = service.port.filter(|port| *port > 0)?;

        let mut tags: BTreeSet<String> = service.tags.unwrap_or_default().into_iter().collect();
        if tags.is_empty() && !tag.is_empty() {
            tags.insert(tag.to_string());
        }

        Some(Self {
            id,
            name: service
                .service
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| name.to_string()),
            address: service
                .address
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| String::from("127.0.0.1")),
            port,
            tags,
            health_check: None,
        })
    }
}

// ============================================================================
// Service Registry
// ============================================================================

/// Registers, deregisters and looks up service instances
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    client: BackendClient,
}

impl ServiceRegistry {
    /// Create a registry over a backend client
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    /// Register an instance; re-registering the same id replaces it
    pub async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        if instance.port == 0 {
            return Err(Error::config(format!(
                "cannot register {} with port 0",
                instance.id
            )));
        }

        self.client
            .put_json(
                "agent_service_register",
                "agent/service/register",
                &instance.to_registration(),
            )
            .await?
            .error_for_status("service registration")?;

        tracing::info!(
            service_id = %instance.id,
            address = %instance.address,
            port = instance.port,
            "Service registered"
        );
        Ok(())
    }

    /// Deregister an instance by id
    ///
    /// Deregistering an id that was never registered succeeds.
    pub async fn deregister(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::config("cannot deregister an empty service id"));
        }

        let response = self
            .client
            .put(
                "agent_service_deregister",
                &format!("agent/service/deregister/{id}"),
                &[],
                None,
            )
            .await?;

        match response.error_for_status("service deregistration") {
            Ok(_) => {
                tracing::info!(service_id = %id, "Service deregistered");
                Ok(())
            }
            Err(Error::NotFound(_)) => {
                tracing::debug!(service_id = %id, "Service was not registered");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Look up the instance of `name` in group `tag`, or the untagged one
    ///
    /// Single attempt; any failure, absence or payload without `ID`/`Port`
    /// yields `None`.
    pub async fn find(&self, name: &str, tag: Option<&str>) -> Option<ServiceInstance> {
        let tag = tag.unwrap_or_default();
        let id = ServiceInstance::instance_id(name, tag);

        let response = match self
            .client
            .get("agent_service", &format!("agent/service/{id}"))
            .await
            .and_then(|r| r.error_for_status("service lookup"))
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(service_id = %id, error = %e, "Service lookup failed");
                return None;
            }
        };

        match response.json::<AgentService>() {
            Ok(service) => {
                let instance = ServiceInstance::from_agent_service(service, name, tag);
                if instance.is_none() {
                    tracing::debug!(service_id = %id, "Service lookup response lacks ID or Port");
                }
                instance
            }
            Err(e) => {
                tracing::debug!(service_id = %id, error = %e, "Service lookup response malformed");
                None
            }
        }
    }
}

#[async_trait]
impl ServiceLookup for ServiceRegistry {
    async fn find(&self, name: &str, tag: Option<&str>) -> Option<ServiceInstance> {
        ServiceRegistry::find(self, name, tag).await
    }
}

// ============================================================================
// Tests
// ============================================================================
