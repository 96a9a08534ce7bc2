//! Trace context propagation formats
//!
//! The default propagator speaks the W3C `traceparent` and `baggage` headers
//! through the OpenTelemetry SDK propagators:
//!
//! ```text
//! traceparent: 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01
//! baggage:     user=42,region=eu%2Dwest
//! ```

use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};

use super::carrier::{HeaderExtractor, HeaderInjector, HeaderSink, HeaderSource};

/// Header carrying trace id, parent span id and flags
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Header carrying baggage items
pub const BAGGAGE_HEADER: &str = "baggage";

/// Moves span contexts in and out of request headers
///
/// Implemented for every OpenTelemetry [`TextMapPropagator`].
pub trait Propagator: Send + Sync {
    /// Read the remote parent; the returned context holds no valid span
    /// when the headers are absent or invalid
    fn extract(&self, carrier: &dyn HeaderSource) -> Context;

    /// Write `cx` so the receiver continues the trace
    fn inject(&self, cx: &Context, carrier: &mut dyn HeaderSink);
}

impl<P> Propagator for P
where
    P: TextMapPropagator + Send + Sync,
{
    fn extract(&self, carrier: &dyn HeaderSource) -> Context {
        TextMapPropagator::extract(self, &HeaderExtractor(carrier))
    }

    fn inject(&self, cx: &Context, carrier: &mut dyn HeaderSink) {
        self.inject_context(cx, &mut HeaderInjector(carrier));
    }
}

/// W3C Trace Context and W3C Baggage
pub fn w3c_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])
}
