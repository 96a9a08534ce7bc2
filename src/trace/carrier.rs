//! Header carriers
//!
//! Propagation reads trace headers through [`HeaderSource`] and writes them
//! through [`HeaderSink`], so it works the same on an inbound request, an
//! outbound `reqwest` header map or a plain map in tests. The OpenTelemetry
//! propagators see a carrier through [`HeaderExtractor`] / [`HeaderInjector`].

use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::{Extractor, Injector};
use std::collections::HashMap;

/// Read access to request headers
pub trait HeaderSource {
    /// Case-insensitive lookup of the first value of `name`
    fn header(&self, name: &str) -> Option<&str>;

    /// Names of every header present
    fn header_names(&self) -> Vec<&str>;
}

/// Write access to request headers
pub trait HeaderSink {
    /// Set `name` to `value`, replacing any previous value
    fn set_header(&mut self, name: &str, value: &str);
}

impl HeaderSource for HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }

    fn header_names(&self) -> Vec<&str> {
        self.keys().map(HeaderName::as_str).collect()
    }
}

impl HeaderSink for HeaderMap {
    fn set_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.insert(name, value);
            }
            _ => tracing::debug!(header = %name, "Skipping header that is not valid HTTP"),
        }
    }
}

impl HeaderSource for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn header_names(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }
}

impl HeaderSink for HashMap<String, String> {
    fn set_header(&mut self, name: &str, value: &str) {
        self.retain(|key, _| !key.eq_ignore_ascii_case(name));
        self.insert(name.to_ascii_lowercase(), value.to_string());
    }
}

// ============================================================================
// OpenTelemetry adapters
// ============================================================================

/// A [`HeaderSource`] seen as an OpenTelemetry [`Extractor`]
pub struct HeaderExtractor<'a, S: ?Sized>(pub &'a S);

impl<S: HeaderSource + ?Sized> Extractor for HeaderExtractor<'_, S> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.header(key)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.header_names()
    }
}

/// A [`HeaderSink`] seen as an OpenTelemetry [`Injector`]
pub struct HeaderInjector<'a, S: ?Sized>(pub &'a mut S);

impl<S: HeaderSink + ?Sized> Injector for HeaderInjector<'_, S> {
    fn set(&mut self, key: &str, value: String) {
        self.0.set_header(key, &value);
    }
}
