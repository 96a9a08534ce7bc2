//! Background leadership observer
//!
//! Polls the holder of a service's leader key at a fixed interval, publishes
//! it on a watch channel and hands it to a callback whenever the holder is not
//! the local session (vacant included). The lifecycle uses the callback to
//! re-attempt acquisition when the key falls vacant.

use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::metrics;

use super::election::LeaderElector;
use super::session::SessionId;

/// Default poll interval
pub const DEFAULT_OBSERVER_INTERVAL: Duration = Duration::from_secs(2);

/// Source of the current leader key holder
#[async_trait]
pub trait LeaderQuery: Send + Sync {
    async fn current_holder(&self, service: &str) -> Result<Option<SessionId>>;
}

#[async_trait]
impl LeaderQuery for LeaderElector {
    async fn current_holder(&self, service: &str) -> Result<Option<SessionId>> {
        LeaderElector::current_holder(self, service).await
    }
}

// ============================================================================
// Observer State
// ============================================================================

/// Lifecycle of an observer; `Stopped` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    Idle,
    Running,
    Stopped,
}

// ============================================================================
// Leadership Observer
// ============================================================================

/// Watches a leader key from a background task
pub struct LeadershipObserver {
    service: String,
    local_session: SessionId,
    source: Arc<dyn LeaderQuery>,
    interval: Duration,
    cancel: CancellationToken,
    state: ObserverState,
    task: Option<JoinHandle<()>>,
    holder_tx: watch::Sender<Option<SessionId>>,
}

impl LeadershipObserver {
    /// Create an idle observer
    ///
    /// The poll loop runs under a child of `parent`, so cancelling the parent
    /// stops it as well.
    pub fn new(
        service: impl Into<String>,
        local_session: SessionId,
        source: Arc<dyn LeaderQuery>,
        parent: &CancellationToken,
    ) -> Self {
        let (holder_tx, _) = watch::channel(None);
        Self {
            service: service.into(),
            local_session,
            source,
            interval: DEFAULT_OBSERVER_INTERVAL,
            cancel: parent.child_token(),
            state: ObserverState::Idle,
            task: None,
            holder_tx,
        }
    }

    /// Set the poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> ObserverState {
        self.state
    }

    /// Holder seen by the most recent poll
    pub fn last_known_holder(&self) -> Option<SessionId> {
        self.holder_tx.borrow().clone()
    }

    /// Receive every change of the last known holder
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionId>> {
        self.holder_tx.subscribe()
    }

    /// Spawn the poll loop and return immediately
    ///
    /// `on_change` runs on the observer task, one call at a time. Its errors
    /// and panics are logged; the loop keeps going.
    pub fn start<F, Fut>(&mut self, on_change: F) -> Result<()>
    where
        F: Fn(Option<SessionId>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.state != ObserverState::Idle {
            return Err(Error::InvalidState(format!(
                "observer for {} is {:?}, not Idle",
                self.service, self.state
            )));
        }

        let poller = Poller {
            service: self.service.clone(),
            local_session: self.local_session.clone(),
            source: Arc::clone(&self.source),
            holder_tx: self.holder_tx.clone(),
        };
        let interval = self.interval;
        let cancel = self.cancel.clone();

        self.task = Some(tokio::spawn(async move {
            poller.run(interval, cancel, on_change).await;
        }));
        self.state = ObserverState::Running;

        tracing::info!(
            service = %self.service,
            interval_ms = self.interval.as_millis() as u64,
            "Leadership observer started"
        );
        Ok(())
    }

    /// Ask the poll loop to exit without waiting for it
    ///
    /// A callback already running is allowed to finish; [`stop`](Self::stop)
    /// waits for that.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop the poll loop and wait for it to exit
    ///
    /// No callback runs after this returns. Stopping twice is a no-op.
    pub async fn stop(&mut self) {
        self.cancel.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(service = %self.service, error = %e, "Observer task ended abnormally");
            }
            tracing::info!(service = %self.service, "Leadership observer stopped");
        }

        self.state = ObserverState::Stopped;
    }
}

impl Drop for LeadershipObserver {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// Poll Loop
// ============================================================================

struct Poller {
    service: String,
    local_session: SessionId,
    source: Arc<dyn LeaderQuery>,
    holder_tx: watch::Sender<Option<SessionId>>,
}

impl Poller {
    async fn run<F, Fut>(self, interval: Duration, cancel: CancellationToken, on_change: F)
    where
        F: Fn(Option<SessionId>) -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<()>> + Send,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let holder = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                holder = self.poll(&mut ticker) => holder,
            };

            if cancel.is_cancelled() {
                break;
            }

            if holder.as_ref() == Some(&self.local_session) {
                continue;
            }

            let callback = AssertUnwindSafe(async { on_change(holder).await }).catch_unwind();
            match callback.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(service = %self.service, error = %e, "Leadership change callback failed");
                    metrics::record_callback_failure(&self.service, "error");
                }
                Err(panic) => {
                    tracing::error!(
                        service = %self.service,
                        panic = %panic_message(panic.as_ref()),
                        "Leadership change callback panicked"
                    );
                    metrics::record_callback_failure(&self.service, "panic");
                }
            }
        }

        tracing::debug!(service = %self.service, "Observer poll loop exited");
    }

    /// Wait for the next tick, read the holder and publish it
    async fn poll(&self, ticker: &mut tokio::time::Interval) -> Option<SessionId> {
        ticker.tick().await;

        let holder = match self.source.current_holder(&self.service).await {
            Ok(holder) => holder,
            Err(e) => {
                tracing::debug!(service = %self.service, error = %e, "Leader key read failed, treating as vacant");
                None
            }
        };
        metrics::record_observer_poll(&self.service, holder.is_some());

        let changed = self.holder_tx.send_if_modified(|current| {
            if *current == holder {
                false
            } else {
                *current = holder.clone();
                true
            }
        });

        match &holder {
            Some(session) if changed => {
                tracing::info!(service = %self.service, holder = %session, "Leader changed")
            }
            None if changed => tracing::info!(service = %self.service, "Leader key is vacant"),
            Some(session) => {
                tracing::debug!(service = %self.service, holder = %session, "Leader unchanged")
            }
            None => tracing::debug!(service = %self.service, "Leader key still vacant"),
        }

        holder
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}

// ============================================================================
// Tests
// ============================================================================
