//! consort - service coordination over a Consul-style backend
//!
//! Registration, discovery, session-scoped leader election and distributed
//! trace propagation for small sets of cooperating service instances.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`backend`] - HTTP client and wire types for the coordination backend
//! - [`coordinator`] - Registry, sessions, leader election, observer, discovery, lifecycle
//! - [`trace`] - Trace context propagation, spans and span export
//! - [`server`] - Health, metrics and traced business routes
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use consort::config::Config;
//! use consort::coordinator::ServiceLifecycle;
//! use consort::server::ServiceServer;
//! use consort::trace::Tracer;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let address = format!("{}:{}", config.server.bind_host, config.service.port).parse()?;
//!     let server = ServiceServer::new(address, Tracer::new(config.service.name.clone()));
//!
//!     let cancel = CancellationToken::new();
//!     ServiceLifecycle::new(config)?.run(server, cancel).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod server;
pub mod trace;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::coordinator::{
        DependencyDiscoverer, LeaderElector, LeaderStatus, LeadershipObserver, ServiceInstance,
        ServiceLifecycle, ServiceRegistry, SessionId, SessionManager,
    };
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::server::ServiceServer;
    pub use crate::trace::{Span, SpanContext, Tracer};
}

// Direct re-exports for convenience
pub use error::{Error, Result};
