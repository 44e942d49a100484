//! Adapters for the services the order service depends on.
//!
//! Each collaborator sits behind an `async_trait` so the orchestrator can be
//! driven by in-memory doubles in tests. The reqwest implementations own only
//! transport concerns: URL building, timeouts, status mapping and decoding.

use std::time::Duration;

use reqwest::Client;

pub mod catalog;
pub mod identity;
pub mod inventory;

/// Build the reqwest client shared by every outbound adapter.
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("order-service/", env!("CARGO_PKG_VERSION")))
        .build()
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("timed out: {error}")
    } else if error.is_decode() {
        format!("malformed response: {error}")
    } else {
        error.to_string()
    }
}
