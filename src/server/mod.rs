//! HTTP server for a coordinated service instance
//!
//! Serves the endpoints the coordination layer itself needs plus whatever
//! business routes the embedding service adds:
//!
//! ```text
//! GET /health    -> 200 {}           (polled by the backend's health check)
//! GET /metrics   -> Prometheus text
//! <business>     -> traced: one span per request, continued from the caller
//! ```

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};
use crate::metrics;
use crate::trace::Tracer;

// ============================================================================
// Handlers
// ============================================================================

/// Liveness endpoint polled by the backend
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({})))
}

/// Prometheus text exposition
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::encode_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {e}"),
        ),
    }
}

/// Open a span per request and finish it with the response status
///
/// The span context is placed in the request extensions so handlers can
/// inject it into outbound calls.
pub async fn trace_requests(State(tracer): State<Tracer>, mut request: Request, next: Next) -> Response {
    let operation = format!("{} {}", request.method(), request.uri().path());
    let span = tracer.start_request_span(&operation, &request);
    request.extensions_mut().insert(span.context().clone());

    let response = next.run(request).await;
    span.finish_http(response.status().as_u16());
    response
}

// ============================================================================
// Service Server
// ============================================================================

/// HTTP server exposing health, metrics and traced business routes
pub struct ServiceServer {
    bind_address: SocketAddr,
    tracer: Tracer,
    routes: Router,
    enable_request_logging: bool,
}

impl ServiceServer {
    /// Create a server with no business routes
    pub fn new(bind_address: SocketAddr, tracer: Tracer) -> Self {
        Self {
            bind_address,
            tracer,
            routes: Router::new(),
            enable_request_logging: true,
        }
    }

    /// Add business routes; each request through them is traced
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    /// Enable or disable tower-http request logging
    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.enable_request_logging = enabled;
        self
    }

    /// Address the server binds
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let traced = self.routes.clone().layer(middleware::from_fn_with_state(
            self.tracer.clone(),
            trace_requests,
        ));

        let mut router = Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics_handler))
            .merge(traced);

        if self.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Bind and serve until `shutdown` is cancelled
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.bind_address)
            .await
            .map_err(|e| Error::Io(format!("failed to bind {}: {e}", self.bind_address)))?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled
    pub async fn serve_on(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let router = self.build_router();
        let local = listener.local_addr()?;

        tracing::info!(address = %local, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!(address = %local, "HTTP server shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
