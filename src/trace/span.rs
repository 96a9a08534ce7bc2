//! In-flight spans and their tags

use opentelemetry::trace::{Status, TraceContextExt};
use opentelemetry::{Context, Key, KeyValue, Value};
use std::fmt;
use std::time::Instant;

use super::context::SpanContext;

/// Tag set when the request failed
pub const TAG_ERROR: &str = "error";
/// HTTP method of the request
pub const TAG_HTTP_METHOD: &str = "http.method";
/// Absolute URL of the request
pub const TAG_HTTP_URL: &str = "http.url";
/// Response status code
pub const TAG_HTTP_STATUS_CODE: &str = "http.status_code";

/// An in-flight span
///
/// Ended exactly once: by [`Span::finish`], or on drop if never finished.
/// The tracer's exporter receives it when it ends.
pub struct Span {
    operation: String,
    cx: Context,
    context: SpanContext,
    started: Instant,
    ended: bool,
}

impl Span {
    pub(crate) fn new(operation: &str, cx: Context, context: SpanContext) -> Self {
        Self {
            operation: operation.to_string(),
            cx,
            context,
            started: Instant::now(),
            ended: false,
        }
    }

    /// Context to propagate to downstream calls
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    /// Operation name
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Set or replace a tag
    pub fn set_tag(&self, key: impl Into<Key>, value: impl Into<Value>) {
        self.cx.span().set_attribute(KeyValue::new(key, value));
    }

    /// Apply final tags and end the span
    ///
    /// An `error = true` tag also marks the span status as failed.
    pub fn finish<I>(mut self, tags: I)
    where
        I: IntoIterator<Item = KeyValue>,
    {
        let mut failed = false;
        {
            let span = self.cx.span();
            for tag in tags {
                if tag.key.as_str() == TAG_ERROR && tag.value == Value::Bool(true) {
                    failed = true;
                }
                span.set_attribute(tag);
            }
            if failed {
                span.set_status(Status::error(format!("{} failed", self.operation)));
            }
        }
        self.end(failed);
    }

    /// Finish with the response status; 4xx and 5xx mark the span as an error
    pub fn finish_http(self, status: u16) {
        self.finish([
            KeyValue::new(TAG_HTTP_STATUS_CODE, i64::from(status)),
            KeyValue::new(TAG_ERROR, status >= 400),
        ]);
    }

    fn end(&mut self, failed: bool) {
        if self.ended {
            return;
        }
        self.ended = true;

        self.cx.span().end();
        crate::metrics::record_span(&self.operation, failed, self.started.elapsed().as_secs_f64());
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("operation", &self.operation)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.end(false);
    }
}
