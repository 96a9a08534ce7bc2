//! Integration tests module
//!
//! End-to-end tests for the coordination layer, run against the in-process
//! fake backend in `common` or against wiremock for malformed responses.

pub mod discovery_test;
pub mod election_test;
pub mod error_scenarios;
