//! Span export to the log
//!
//! [`LogExporter`] writes each ended span as one structured `tracing` event.
//! Tests swap in the SDK's in-memory exporter through
//! [`Tracer::with_exporter`](super::Tracer::with_exporter).

use chrono::{DateTime, Utc};
use opentelemetry::trace::{SpanId, Status};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use std::future::Future;

/// Logs ended spans through `tracing`
#[derive(Debug, Clone)]
pub struct LogExporter {
    service: String,
}

impl LogExporter {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn log(&self, span: &SpanData) {
        let context = &span.span_context;
        let parent = if span.parent_span_id == SpanId::INVALID {
            String::new()
        } else {
            span.parent_span_id.to_string()
        };
        let duration = span
            .end_time
            .duration_since(span.start_time)
            .unwrap_or_default();
        let start_time: DateTime<Utc> = span.start_time.into();
        let tags = span
            .attributes
            .iter()
            .map(|kv| format!("{}={}", kv.key, kv.value))
            .collect::<Vec<_>>()
            .join(" ");

        tracing::info!(
            target: "consort::span",
            service = %self.service,
            operation = %span.name,
            trace_id = %context.trace_id(),
            span_id = %context.span_id(),
            parent_span_id = %parent,
            start_time = %start_time.to_rfc3339(),
            duration_us = duration.as_micros() as u64,
            error = matches!(span.status, Status::Error { .. }),
            tags = %tags,
            "Span finished"
        );
    }
}

impl SpanExporter for LogExporter {
    fn export(&self, batch: Vec<SpanData>) -> impl Future<Output = OTelSdkResult> + Send {
        for span in &batch {
            self.log(span);
        }
        std::future::ready(Ok(()))
    }
}
