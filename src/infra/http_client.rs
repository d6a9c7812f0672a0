//! Shared reqwest client construction.
//!
//! Every outbound HTTP adapter (LLM, payment gateway, email, SMS) goes
//! through this module so connect/request timeouts stay consistent.

use reqwest::Client;
use std::time::Duration;

/// Connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request/response budget for ordinary API calls (gateway, email,
/// SMS). The LLM client sets its own per-request timeout on top.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a client with the default timeouts.
///
/// Panics if the client cannot be built (e.g., TLS misconfiguration),
/// which is acceptable in singleton adapter constructors: the service
/// cannot run without its HTTP clients.
pub fn build_client() -> Client {
    build_client_with_timeout(DEFAULT_REQUEST_TIMEOUT)
}

pub fn build_client_with_timeout(request_timeout: Duration) -> Client {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .expect("Failed to build HTTP client")
}
