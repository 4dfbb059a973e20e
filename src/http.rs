//! Shared HTTP client factory.
//!
//! Provides consistent HTTP client configuration across the codebase.

use reqwest::Client;
use std::time::Duration;

/// Default timeout for API calls (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Short timeout for token lookups (2 seconds).
pub const DETECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Connect timeout for streaming calls. The body itself has no deadline.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a new HTTP client with the default timeout.
pub fn create_client() -> Client {
    create_client_with_timeout(DEFAULT_TIMEOUT)
}

/// Create a new HTTP client with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client")
}

/// Create a client for long-lived event streams.
///
/// Only connecting is bounded; a stream ends when the upstream closes it.
pub fn create_streaming_client() -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .expect("Failed to create streaming HTTP client")
}
