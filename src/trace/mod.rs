//! Distributed trace context propagation
//!
//! Every inbound request opens a span, continuing the caller's trace when the
//! request carries one. Outbound calls inject the current span's context so
//! the next hop does the same. Spans come from an OpenTelemetry SDK tracer
//! and are handed to its exporter when they end.
//!
//! ```text
//! inbound headers ──extract──▶ parent? ──▶ Span (child or root)
//!                                              │
//!                      outbound headers ◀──inject
//!                                              │
//!                                  end ──▶ SpanExporter
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use consort::trace::Tracer;
//!
//! let tracer = Tracer::new("forecaster");
//! let span = tracer.start_request_span("forecast", &request);
//!
//! let mut headers = reqwest::header::HeaderMap::new();
//! tracer.inject(span.context(), &mut headers);
//! let quote = client.get(url).headers(headers).send().await?;
//!
//! span.finish_http(200);
//! ```

pub mod carrier;
pub mod context;
pub mod exporter;
pub mod propagation;
pub mod span;

pub use carrier::{HeaderExtractor, HeaderInjector, HeaderSink, HeaderSource};
pub use context::SpanContext;
pub use exporter::LogExporter;
pub use propagation::{w3c_propagator, Propagator};
pub use span::Span;

use axum::http::{header, Request};
use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer as _, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracer, SdkTracerProvider, SpanExporter};
use opentelemetry_sdk::Resource;
use std::sync::Arc;

use crate::utils::absolute_url;

/// Opens spans and moves their context across process boundaries
#[derive(Clone)]
pub struct Tracer {
    service: String,
    provider: SdkTracerProvider,
    tracer: SdkTracer,
    propagator: Arc<dyn Propagator>,
}

impl Tracer {
    /// Tracer for `service` using W3C headers and log export
    pub fn new(service: impl Into<String>) -> Self {
        let service = service.into();
        let exporter = LogExporter::new(service.clone());
        Self::with_exporter(service, exporter)
    }

    /// Tracer for `service` handing every ended span to `exporter`
    ///
    /// Spans are exported synchronously as they end; every span is sampled.
    pub fn with_exporter<E>(service: impl Into<String>, exporter: E) -> Self
    where
        E: SpanExporter + 'static,
    {
        let service = service.into();
        let resource = Resource::builder_empty()
            .with_attributes([KeyValue::new("service.name", service.clone())])
            .build();

        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter)
            .with_sampler(Sampler::AlwaysOn)
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource)
            .build();
        let tracer = provider.tracer(service.clone());

        Self {
            service,
            provider,
            tracer,
            propagator: Arc::new(w3c_propagator()),
        }
    }

    /// Replace the propagation format
    pub fn with_propagator(mut self, propagator: Arc<dyn Propagator>) -> Self {
        self.propagator = propagator;
        self
    }

    /// Service name stamped on every span
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Open a span for an inbound call
    ///
    /// Continues the trace found in `carrier`, or starts a new one when the
    /// carrier holds no valid context. Tags `http.method` and `http.url`.
    pub fn start_span<C: HeaderSource>(
        &self,
        operation: &str,
        method: &str,
        url: &str,
        carrier: &C,
    ) -> Span {
        let parent = self.propagator.extract(carrier);
        if SpanContext::span_id_in(&parent).is_none()
            && carrier.header(propagation::TRACEPARENT_HEADER).is_some()
        {
            tracing::debug!(operation = %operation, "Ignoring invalid traceparent header");
        }

        self.open(
            operation,
            SpanKind::Server,
            parent,
            vec![
                KeyValue::new(span::TAG_HTTP_METHOD, method.to_string()),
                KeyValue::new(span::TAG_HTTP_URL, url.to_string()),
            ],
        )
    }

    /// Open a span for an inbound HTTP request
    ///
    /// The URL tag is absolute, rebuilt from the `Host` header when the
    /// request line only carries a path.
    pub fn start_request_span<B>(&self, operation: &str, request: &Request<B>) -> Span {
        let uri = request.uri();
        let url = if uri.scheme().is_some() && uri.authority().is_some() {
            uri.to_string()
        } else {
            let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
            match request
                .headers()
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
            {
                Some(host) => absolute_url("http", host, path),
                None => path.to_string(),
            }
        };

        self.start_span(operation, request.method().as_str(), &url, request.headers())
    }

    /// Open a span with no inbound context
    pub fn start_root_span(&self, operation: &str) -> Span {
        self.open(operation, SpanKind::Internal, Context::new(), Vec::new())
    }

    /// Write `context` into outbound headers
    pub fn inject<S: HeaderSink>(&self, context: &SpanContext, carrier: &mut S) {
        self.propagator.inject(&context.to_context(), carrier);
    }

    /// Flush and stop the exporter; spans ended afterwards are dropped
    pub fn shutdown(&self) {
        if let Err(e) = self.provider.shutdown() {
            tracing::warn!(service = %self.service, error = ?e, "Tracer shutdown failed");
        }
    }

    fn open(&self, operation: &str, kind: SpanKind, parent: Context, tags: Vec<KeyValue>) -> Span {
        let parent_span_id = SpanContext::span_id_in(&parent);
        let span = self
            .tracer
            .span_builder(operation.to_string())
            .with_kind(kind)
            .with_attributes(tags)
            .start_with_context(&self.tracer, &parent);

        let cx = parent.with_span(span);
        let context = SpanContext::of(&cx, parent_span_id);
        Span::new(operation, cx, context)
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}
