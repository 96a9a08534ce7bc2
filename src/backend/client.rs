//! HTTP client for the coordination backend
//!
//! Thin wrapper over `reqwest` that knows the base URL, the ACL token and the
//! request timeout. It never retries; callers decide.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::utils::{join_url, truncate_text};

/// Header carrying the backend ACL token
pub const TOKEN_HEADER: &str = "X-Consul-Token";

// ============================================================================
// Backend Response
// ============================================================================

/// Status and body of a completed backend request
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub body: String,
}

impl BackendResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turn a non-2xx response into an error
    ///
    /// 404 maps to [`Error::NotFound`], every other non-2xx status to
    /// [`Error::Backend`] carrying the status and a truncated body.
    pub fn error_for_status(self, what: &str) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else if self.status == StatusCode::NOT_FOUND {
            Err(Error::not_found(what))
        } else {
            Err(Error::status(
                self.status.as_u16(),
                format!("{what}: {}", truncate_text(self.body.trim(), 200)),
            ))
        }
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| Error::malformed(format!("unexpected response body: {e}")))
    }
}

// ============================================================================
// Backend Client
// ============================================================================

/// Client for the coordination backend's HTTP API
#[derive(Debug, Clone)]
pub struct BackendClient {
    http_client: Client,
    base_url: String,
    token: Option<String>,
}

impl BackendClient {
    /// Create a client from the backend configuration
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut client = Self::with_timeout(&config.url, Duration::from_secs(config.timeout_secs))?;
        client.token = config.token.clone().filter(|t| !t.is_empty());
        Ok(client)
    }

    /// Create a client for a base URL with a request timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            token: None,
        })
    }

    /// Base URL including the API version prefix
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET {base}/{path}`
    pub async fn get(&self, operation: &str, path: &str) -> Result<BackendResponse> {
        let request = self.http_client.get(join_url(&self.base_url, path));
        self.send(operation, request).await
    }

    /// `PUT {base}/{path}?{query}` with an optional raw body
    pub async fn put(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<BackendResponse> {
        let mut request = self
            .http_client
            .put(join_url(&self.base_url, path))
            .query(query);
        if let Some(body) = body {
            request = request.body(body);
        }
        self.send(operation, request).await
    }

    /// `PUT {base}/{path}` with a JSON body
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        operation: &str,
        path: &str,
        body: &T,
    ) -> Result<BackendResponse> {
        let request = self
            .http_client
            .put(join_url(&self.base_url, path))
            .json(body);
        self.send(operation, request).await
    }

    async fn send(
        &self,
        operation: &str,
        mut request: reqwest::RequestBuilder,
    ) -> Result<BackendResponse> {
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let started = Instant::now();
        let result = Self::execute(request).await;
        let elapsed = started.elapsed().as_secs_f64();

        let outcome = match &result {
            Ok(response) if response.is_success() => "ok",
            Ok(response) if response.status == StatusCode::NOT_FOUND => "not_found",
            Ok(_) => "error_status",
            Err(e) => e.category().label(),
        };
        metrics::record_backend_request(operation, outcome, elapsed);

        match &result {
            Ok(response) => tracing::debug!(
                operation = operation,
                status = response.status.as_u16(),
                elapsed_ms = (elapsed * 1000.0) as u64,
                "Backend request completed"
            ),
            Err(e) => tracing::debug!(operation = operation, error = %e, "Backend request failed"),
        }

        result
    }

    async fn execute(request: reqwest::RequestBuilder) -> Result<BackendResponse> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?;

        Ok(BackendResponse { status, body })
    }
}

// ============================================================================
// Tests
// ============================================================================
