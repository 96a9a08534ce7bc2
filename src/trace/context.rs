//! The propagated span context
//!
//! A plain snapshot of what crosses process boundaries, handed to request
//! handlers so they can inject it into outbound calls.

use opentelemetry::baggage::BaggageExt;
use opentelemetry::trace::{self, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::{IdGenerator, RandomIdGenerator};
use std::collections::BTreeMap;

/// The part of a span that crosses process boundaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub baggage: BTreeMap<String, String>,
    pub sampled: bool,
}

impl SpanContext {
    /// Start a new, sampled trace
    pub fn new_root() -> Self {
        let ids = RandomIdGenerator::default();
        Self {
            trace_id: ids.new_trace_id(),
            span_id: ids.new_span_id(),
            parent_span_id: None,
            baggage: BTreeMap::new(),
            sampled: true,
        }
    }

    /// Whether this span starts its trace
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Attach a baggage item that travels with the trace
    pub fn with_baggage_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.baggage.insert(key.into(), value.into());
        self
    }

    /// Snapshot the span and baggage carried by `cx`
    pub(crate) fn of(cx: &Context, parent_span_id: Option<SpanId>) -> Self {
        let span = cx.span();
        let span_context = span.span_context();

        let baggage = cx
            .baggage()
            .iter()
            .map(|(key, (value, _))| (key.as_str().to_string(), value.to_string()))
            .collect();

        Self {
            trace_id: span_context.trace_id(),
            span_id: span_context.span_id(),
            parent_span_id,
            baggage,
            sampled: span_context.is_sampled(),
        }
    }

    /// Span id of the valid span in `cx`, if any
    pub(crate) fn span_id_in(cx: &Context) -> Option<SpanId> {
        let span = cx.span();
        let span_context = span.span_context();
        span_context.is_valid().then(|| span_context.span_id())
    }

    /// An OpenTelemetry context holding this span as a remote parent
    pub fn to_context(&self) -> Context {
        let flags = if self.sampled {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::default()
        };
        let remote = trace::SpanContext::new(
            self.trace_id,
            self.span_id,
            flags,
            true,
            TraceState::default(),
        );

        let cx = Context::new().with_remote_span_context(remote);
        if self.baggage.is_empty() {
            return cx;
        }
        cx.with_baggage(
            self.baggage
                .iter()
                .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
        )
    }
}
