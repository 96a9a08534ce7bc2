//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the crate.

pub mod retry;

use url::Url;

/// Join a backend base URL and a relative API path
///
/// Trailing slashes on the base and leading slashes on the path are collapsed
/// so `http://host:8500/v1/` + `/kv/x` yields `http://host:8500/v1/kv/x`.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Build an absolute URL from a scheme, an authority and a path-and-query
///
/// Falls back to the bare path when the pieces do not form a valid URL.
pub fn absolute_url(scheme: &str, host: &str, path_and_query: &str) -> String {
    let candidate = format!("{scheme}://{host}{path_and_query}");
    match Url::parse(&candidate) {
        Ok(url) => url.to_string(),
        Err(_) => path_and_query.to_string(),
    }
}

/// Truncate text to a maximum length
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
