//! Configuration management for consort
//!
//! This module handles loading and validating configuration from environment variables,
//! TOML files, and command-line overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default address of the coordination backend's HTTP API
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8500/v1";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Coordination backend connection
    pub backend: BackendConfig,

    /// The service instance this process advertises
    pub service: ServiceConfig,

    /// Session and leader election settings
    pub election: ElectionConfig,

    /// Startup dependency discovery
    pub discovery: DiscoveryConfig,

    /// HTTP server (health and metrics endpoints)
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Coordination backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend HTTP API, including the version prefix
    pub url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// ACL token sent with every request (optional)
    pub token: Option<String>,
}

/// Advertised service instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Logical service name shared by all replicas
    pub name: String,

    /// Replica group, registered as the instance tag
    pub group: String,

    /// Address other services use to reach this instance
    pub address: String,

    /// Port this instance listens on
    pub port: u16,

    /// Interval between backend health checks against `/health`
    pub health_check_interval_secs: u64,

    /// Let the backend drop the registration after this long in critical state
    pub deregister_critical_after_secs: Option<u64>,
}

/// Session and leader election configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Whether this instance takes part in leader election
    pub enabled: bool,

    /// Leadership observer poll interval in seconds
    pub observer_interval_secs: u64,

    /// Session TTL in seconds; `None` keeps the session until destroyed
    pub session_ttl_secs: Option<u64>,

    /// Lock delay applied by the backend after a session is invalidated
    pub lock_delay_secs: Option<u64>,
}

/// Dependency discovery configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Services that must be discoverable before serving traffic
    pub dependencies: Vec<String>,

    /// Fixed delay between discovery rounds, in milliseconds
    pub poll_interval_ms: u64,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind; the port comes from the service section
    pub bind_host: String,

    /// Enable tower-http request logging
    pub enable_request_logging: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            timeout_secs: 5,
            token: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: String::from("service"),
            group: String::from("primary"),
            address: String::from("127.0.0.1"),
            port: 16000,
            health_check_interval_secs: 10,
            deregister_critical_after_secs: None,
        }
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            observer_interval_secs: 2,
            session_ttl_secs: None,
            lock_delay_secs: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: String::from("127.0.0.1"),
            enable_request_logging: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl LoggingConfig {
    /// Apply command-line overrides: `--verbose` forces debug, `--log-format` replaces the format
    #[must_use]
    pub fn with_overrides(mut self, verbose: bool, format: Option<&str>) -> Self {
        if verbose {
            self.level = String::from("debug");
        }
        if let Some(format) = format {
            self.format = format.to_string();
        }
        self
    }

    /// `EnvFilter` directive: this crate at `level`, dependencies at warn
    #[must_use]
    pub fn filter_directive(&self) -> String {
        format!("consort={},warn", self.level.to_lowercase())
    }

    /// Whether events are written as JSON lines
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            service: ServiceConfig::default(),
            election: ElectionConfig::default(),
            discovery: DiscoveryConfig {
                dependencies: Vec::new(),
                poll_interval_ms: 1000,
            },
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset variables fall back to the defaults:
    /// - `CONSORT_BACKEND_URL`, `CONSORT_BACKEND_TIMEOUT`, `CONSORT_BACKEND_TOKEN`
    /// - `CONSORT_SERVICE_NAME`, `CONSORT_SERVICE_GROUP`, `CONSORT_SERVICE_ADDRESS`,
    ///   `CONSORT_SERVICE_PORT`, `CONSORT_HEALTH_INTERVAL`
    /// - `CONSORT_ELECTION_ENABLED`, `CONSORT_OBSERVER_INTERVAL`, `CONSORT_SESSION_TTL`
    /// - `CONSORT_DEPENDENCIES` (comma separated), `CONSORT_DISCOVERY_INTERVAL_MS`
    /// - `CONSORT_LOG_LEVEL`, `CONSORT_LOG_FORMAT`
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let dependencies = std::env::var("CONSORT_DEPENDENCIES")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            backend: BackendConfig {
                url: std::env::var("CONSORT_BACKEND_URL").unwrap_or(defaults.backend.url),
                timeout_secs: env_parse("CONSORT_BACKEND_TIMEOUT")
                    .unwrap_or(defaults.backend.timeout_secs),
                token: std::env::var("CONSORT_BACKEND_TOKEN").ok(),
            },
            service: ServiceConfig {
                name: std::env::var("CONSORT_SERVICE_NAME").unwrap_or(defaults.service.name),
                group: std::env::var("CONSORT_SERVICE_GROUP").unwrap_or(defaults.service.group),
                address: std::env::var("CONSORT_SERVICE_ADDRESS")
                    .unwrap_or(defaults.service.address),
                port: env_parse("CONSORT_SERVICE_PORT").unwrap_or(defaults.service.port),
                health_check_interval_secs: env_parse("CONSORT_HEALTH_INTERVAL")
                    .unwrap_or(defaults.service.health_check_interval_secs),
                deregister_critical_after_secs: env_parse("CONSORT_DEREGISTER_AFTER"),
            },
            election: ElectionConfig {
                enabled: env_parse("CONSORT_ELECTION_ENABLED")
                    .unwrap_or(defaults.election.enabled),
                observer_interval_secs: env_parse("CONSORT_OBSERVER_INTERVAL")
                    .unwrap_or(defaults.election.observer_interval_secs),
                session_ttl_secs: env_parse("CONSORT_SESSION_TTL"),
                lock_delay_secs: env_parse("CONSORT_LOCK_DELAY"),
            },
            discovery: DiscoveryConfig {
                dependencies,
                poll_interval_ms: env_parse("CONSORT_DISCOVERY_INTERVAL_MS")
                    .unwrap_or(defaults.discovery.poll_interval_ms),
            },
            server: defaults.server,
            logging: LoggingConfig {
                level: std::env::var("CONSORT_LOG_LEVEL").unwrap_or(defaults.logging.level),
                format: std::env::var("CONSORT_LOG_FORMAT").unwrap_or(defaults.logging.format),
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.backend.url).is_err() {
            anyhow::bail!("backend.url is not a valid URL: {}", self.backend.url);
        }

        if self.backend.timeout_secs == 0 {
            anyhow::bail!("backend.timeout_secs must be greater than 0");
        }

        if self.service.name.trim().is_empty() {
            anyhow::bail!("service.name must not be empty");
        }

        if self.service.port == 0 {
            anyhow::bail!("service.port must be greater than 0");
        }

        if self.service.health_check_interval_secs == 0 {
            anyhow::bail!("service.health_check_interval_secs must be greater than 0");
        }

        if self.election.observer_interval_secs == 0 {
            anyhow::bail!("election.observer_interval_secs must be greater than 0");
        }

        if let Some(ttl) = self.election.session_ttl_secs {
            // The backend only accepts session TTLs between 10s and 24h
            if !(10..=86_400).contains(&ttl) {
                anyhow::bail!("election.session_ttl_secs must be between 10 and 86400");
            }
        }

        if self.discovery.poll_interval_ms == 0 {
            anyhow::bail!("discovery.poll_interval_ms must be greater than 0");
        }

        let level = self.logging.level.to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            anyhow::bail!("logging.level must be one of trace, debug, info, warn, error");
        }

        if !["text", "json"].contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!("logging.format must be text or json");
        }

        Ok(())
    }

    /// Get backend request timeout as Duration
    #[must_use]
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }

    /// Get the health check interval as Duration
    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.service.health_check_interval_secs)
    }

    /// Get the observer poll interval as Duration
    #[must_use]
    pub fn observer_interval(&self) -> Duration {
        Duration::from_secs(self.election.observer_interval_secs)
    }

    /// Get the discovery poll interval as Duration
    #[must_use]
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery.poll_interval_ms)
    }
}
