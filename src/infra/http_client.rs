//! HTTP client factory with consistent timeout configuration.
//!
//! Outbound clients should be built here rather than constructing
//! `reqwest::Client` directly.

use reqwest::Client;
use std::time::Duration;

/// Connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request/response time. Resolution applies its own, shorter bound
/// on top of this.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build an HTTP client with default timeouts.
///
/// Falls back to a client without timeouts if the TLS backend refuses the
/// builder configuration; callers still bound every call themselves.
pub fn build_client() -> Client {
    try_build_client().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build HTTP client with timeouts");
        Client::new()
    })
}

pub fn try_build_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
}
