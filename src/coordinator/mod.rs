//! Coordination layer for cooperating service instances
//!
//! This module lets redundant replicas of a service advertise themselves,
//! agree on a single leader, and find the services they depend on.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               ServiceLifecycle               │
//! │                                              │
//! │  ┌──────────────┐   ┌─────────────────────┐  │
//! │  │ Dependency   │   │  ServiceRegistry    │  │
//! │  │ Discoverer   │──▶│  - register         │  │
//! │  └──────────────┘   │  - deregister       │  │
//! │                     │  - find             │  │
//! │                     └─────────────────────┘  │
//! │  ┌──────────────┐   ┌─────────────────────┐  │
//! │  │ Session      │──▶│  LeaderElector      │  │
//! │  │ Manager      │   │  - acquire/release  │  │
//! │  └──────────────┘   └─────────────────────┘  │
//! │                               ▲              │
//! │                     ┌─────────┴───────────┐  │
//! │                     │ LeadershipObserver  │  │
//! │                     │ (background poll)   │  │
//! │                     └─────────────────────┘  │
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//!             coordination backend (HTTP)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use consort::coordinator::ServiceLifecycle;
//!
//! let lifecycle = ServiceLifecycle::new(config)?;
//! lifecycle.run(server, cancel).await?;
//! ```

pub mod discovery;
pub mod election;
pub mod lifecycle;
pub mod observer;
pub mod registry;
pub mod session;

// Re-export main types
pub use discovery::{DependencyDiscoverer, ServiceLookup};
pub use election::{leader_key, parse_acquire_response, LeaderElector, LeaderStatus};
pub use lifecycle::ServiceLifecycle;
pub use observer::{LeaderQuery, LeadershipObserver, ObserverState};
pub use registry::{HealthCheck, ServiceInstance, ServiceRegistry};
pub use session::{SessionId, SessionManager};
