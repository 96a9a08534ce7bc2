//! Instance lifecycle
//!
//! Ties the coordination pieces together in the order a service needs them:
//!
//! 1. wait for dependencies (cancellable)
//! 2. bind the HTTP server so `/health` answers
//! 3. register, create a session, try to become leader
//! 4. watch the leader key and re-acquire whenever it falls vacant
//! 5. on shutdown: release the lock, destroy the session, deregister, stop the observer

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backend::BackendClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics;
use crate::server::ServiceServer;
use crate::utils::retry::{with_retry_if, RetryConfig};

use super::discovery::DependencyDiscoverer;
use super::election::{LeaderElector, LeaderStatus};
use super::observer::LeadershipObserver;
use super::registry::{ServiceInstance, ServiceRegistry};
use super::session::{SessionId, SessionManager};

/// Drives registration, election and teardown for the local instance
pub struct ServiceLifecycle {
    config: Config,
    instance: ServiceInstance,
    registry: ServiceRegistry,
    sessions: SessionManager,
    elector: Arc<LeaderElector>,
    retry: RetryConfig,
    session: Option<SessionId>,
    observer: Option<LeadershipObserver>,
    status: Arc<Mutex<LeaderStatus>>,
}

impl ServiceLifecycle {
    /// Build the lifecycle for the instance described by `config`
    pub fn new(config: Config) -> Result<Self> {
        let client = BackendClient::new(&config.backend)?;
        let instance = ServiceInstance::from_config(&config.service);

        Ok(Self {
            registry: ServiceRegistry::new(client.clone()),
            sessions: SessionManager::from_config(client.clone(), &config.election),
            elector: Arc::new(LeaderElector::new(client, instance.id.clone())),
            retry: RetryConfig::default(),
            session: None,
            observer: None,
            status: Arc::new(Mutex::new(LeaderStatus::HeldByOther)),
            config,
            instance,
        })
    }

    /// Override the retry policy for registration and session creation
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The local instance
    pub fn instance(&self) -> &ServiceInstance {
        &self.instance
    }

    /// Registry used by this lifecycle
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Session held by this instance, once created
    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    /// Latest leadership outcome
    pub fn leader_status(&self) -> LeaderStatus {
        lock_status(&self.status).clone()
    }

    /// Whether this instance currently believes it is leader
    pub fn is_leader(&self) -> bool {
        lock_status(&self.status).is_leader()
    }

    /// Last known holder of the leader key, while the observer runs
    pub fn subscribe_leader(&self) -> Option<watch::Receiver<Option<SessionId>>> {
        self.observer.as_ref().map(LeadershipObserver::subscribe)
    }

    /// Block until every configured dependency is discoverable
    pub async fn await_dependencies(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, u16>> {
        let names = &self.config.discovery.dependencies;
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        tracing::info!(dependencies = ?names, "Waiting for dependencies");
        DependencyDiscoverer::new(self.registry.clone(), &self.config.service.group)
            .await_all(names.as_slice(), self.config.discovery_interval(), cancel)
            .await
    }

    /// Register, create a session, attempt leadership and start observing
    ///
    /// Registration and session failures are logged and leave the instance
    /// serving without them; leadership is then simply never attempted.
    /// Cancelling `cancel` abandons the remaining retries.
    pub async fn start(&mut self, cancel: &CancellationToken) -> Result<()> {
        let registered = tokio::select! {
            result = with_retry_if(
                &self.retry,
                || self.registry.register(&self.instance),
                Error::is_recoverable,
            ) => result,
            _ = cancel.cancelled() => {
                tracing::info!(service_id = %self.instance.id, "Shutdown requested during registration");
                return Ok(());
            }
        };
        if let Err(e) = registered {
            tracing::error!(service_id = %self.instance.id, error = %e, "Service registration failed");
        }

        if !self.config.election.enabled {
            tracing::info!("Leader election disabled");
            return Ok(());
        }

        let created = tokio::select! {
            result = with_retry_if(
                &self.retry,
                || self.sessions.create(&self.instance.id),
                Error::is_recoverable,
            ) => result,
            _ = cancel.cancelled() => {
                tracing::info!(service_id = %self.instance.id, "Shutdown requested during session creation");
                return Ok(());
            }
        };
        let session = match created {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "Session creation failed, not taking part in leader election");
                return Ok(());
            }
        };

        let service = self.instance.name.clone();
        let status = self.elector.acquire(&service, &session).await;
        *lock_status(&self.status) = status;

        let mut observer = LeadershipObserver::new(
            service.clone(),
            session.clone(),
            self.elector.clone(),
            cancel,
        )
        .with_interval(self.config.observer_interval());

        let elector = Arc::clone(&self.elector);
        let shared_status = Arc::clone(&self.status);
        let local = session.clone();
        observer.start(move |holder| {
            let elector = Arc::clone(&elector);
            let status = Arc::clone(&shared_status);
            let service = service.clone();
            let local = local.clone();
            async move { on_leader_change(&elector, &status, &service, &local, holder).await }
        })?;

        self.session = Some(session);
        self.observer = Some(observer);
        Ok(())
    }

    /// Tear down in order: release, destroy session, deregister, stop observer
    ///
    /// Every step is best effort and bounded by the client timeout. Polling
    /// is halted before the lock is released so the observer cannot take it
    /// back; the final stop joins the loop and any callback still in flight.
    pub async fn shutdown(&mut self) {
        if let Some(observer) = &self.observer {
            observer.cancel();
        }

        if let Some(session) = self.session.take() {
            self.elector.release(&self.instance.name, &session).await;
            self.sessions.destroy(&session).await;
        }

        if let Err(e) = self.registry.deregister(&self.instance.id).await {
            tracing::warn!(service_id = %self.instance.id, error = %e, "Service deregistration failed");
        }

        if let Some(mut observer) = self.observer.take() {
            observer.stop().await;
        }
        *lock_status(&self.status) = LeaderStatus::HeldByOther;
        metrics::set_leader(&self.instance.name, false);

        tracing::info!(service_id = %self.instance.id, "Coordination shutdown complete");
    }

    /// Run the whole lifecycle around `server` until `cancel` fires
    pub async fn run(mut self, server: ServiceServer, cancel: CancellationToken) -> Result<()> {
        let dependencies = self.await_dependencies(&cancel).await?;
        for (name, port) in &dependencies {
            tracing::info!(dependency = %name, port = port, "Using dependency");
        }

        let listener = TcpListener::bind(server.bind_address())
            .await
            .map_err(|e| Error::Io(format!("failed to bind {}: {e}", server.bind_address())))?;
        let mut server_task = tokio::spawn(server.serve_on(listener, cancel.clone()));

        if let Err(e) = self.start(&cancel).await {
            cancel.cancel();
            self.shutdown().await;
            let _ = server_task.await;
            return Err(e);
        }

        let mut served = None;
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Shutdown requested");
            }
            result = &mut server_task => {
                tracing::error!("HTTP server exited before shutdown was requested");
                served = Some(result);
            }
        }

        cancel.cancel();
        self.shutdown().await;

        let served = match served {
            Some(result) => result,
            None => server_task.await,
        };
        served.map_err(|e| Error::Io(format!("server task failed: {e}")))?
    }
}

impl Drop for ServiceLifecycle {
    fn drop(&mut self) {
        if self.session.is_some() {
            tracing::warn!(
                service_id = %self.instance.id,
                "Lifecycle dropped without shutdown; the session lingers until it expires"
            );
        }
    }
}

/// Observer callback: re-acquire on vacancy, record loss otherwise
async fn on_leader_change(
    elector: &LeaderElector,
    status: &Mutex<LeaderStatus>,
    service: &str,
    local: &SessionId,
    holder: Option<SessionId>,
) -> anyhow::Result<()> {
    match holder {
        None => {
            tracing::info!(service = %service, "Leader key vacant, attempting acquisition");
            let outcome = elector.acquire(service, local).await;
            let failure = match &outcome {
                LeaderStatus::Error(e) => Some(e.clone()),
                _ => None,
            };
            *lock_status(status) = outcome;

            match failure {
                Some(e) => Err(e.into()),
                None => Ok(()),
            }
        }
        Some(other) => {
            let mut current = lock_status(status);
            if current.is_leader() {
                tracing::warn!(service = %service, holder = %other, "Leadership lost to another session");
            }
            *current = LeaderStatus::HeldByOther;
            Ok(())
        }
    }
}

fn lock_status(status: &Mutex<LeaderStatus>) -> MutexGuard<'_, LeaderStatus> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
