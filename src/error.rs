//! Unified error handling for Fluency.
//!
//! Provides a consistent error type for the HTTP surface. Bodies are flat
//! `{"error": "..."}` objects; rate-limit rejections add their quota fields
//! and `X-RateLimit-*` headers.

use crate::throttle::RateLimitResult;
use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

pub const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const HEADER_AUTHENTICATED: HeaderName = HeaderName::from_static("x-ratelimit-authenticated");

/// Unified error type for Fluency operations.
#[derive(Debug, Clone)]
pub enum FluencyError {
    /// Upstream API key not configured.
    ApiKeyMissing,
    /// Daily AI quota used up.
    RateLimited(RateLimitResult),
    /// Upstream answered with a non-2xx status; body is forwarded verbatim.
    Upstream { status: u16, body: String },
    /// Upstream could not be reached.
    UpstreamUnreachable(String),
    /// Feedback request named an unknown interaction kind.
    UnknownFeedbackType,
    /// Request body could not be understood.
    InvalidRequest(String),
    /// Content or route not found.
    NotFound(String),
    /// Content files exist but could not be read or parsed.
    ContentError(String),
    /// Configuration error.
    ConfigError(String),
    /// Internal error.
    Internal(String),
}

impl fmt::Display for FluencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKeyMissing => write!(f, "ANTHROPIC_API_KEY not configured"),
            Self::RateLimited(_) => write!(f, "Rate limit exceeded"),
            Self::Upstream { status, .. } => write!(f, "Upstream returned {}", status),
            Self::UpstreamUnreachable(msg) => write!(f, "Upstream request failed: {}", msg),
            Self::UnknownFeedbackType => write!(f, "Unknown feedback type"),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::NotFound(what) => write!(f, "{} not found", what),
            Self::ContentError(msg) => write!(f, "Content error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for FluencyError {}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct RateLimitBody {
    error: String,
    authenticated: bool,
    limit: u32,
    remaining: u32,
}

impl FluencyError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ApiKeyMissing => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::UpstreamUnreachable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UnknownFeedbackType => StatusCode::BAD_REQUEST,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ContentError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string (used in logs).
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ApiKeyMissing => "configuration_error",
            Self::RateLimited(_) => "rate_limited",
            Self::Upstream { .. } => "upstream_error",
            Self::UpstreamUnreachable(_) => "upstream_error",
            Self::UnknownFeedbackType => "invalid_request",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::ContentError(_) => "content_error",
            Self::ConfigError(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// `X-RateLimit-*` headers describing a throttle result.
pub fn rate_limit_headers(result: &RateLimitResult, include_limit: bool) -> Vec<(HeaderName, HeaderValue)> {
    let mut headers = vec![
        (HEADER_REMAINING, HeaderValue::from(result.remaining)),
        (
            HEADER_AUTHENTICATED,
            HeaderValue::from_static(if result.authenticated { "true" } else { "false" }),
        ),
    ];
    if include_limit {
        headers.push((HEADER_LIMIT, HeaderValue::from(result.limit)));
    }
    headers
}

fn rate_limit_response(result: RateLimitResult) -> Response {
    let rejected = RateLimitResult {
        remaining: 0,
        ..result
    };
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(RateLimitBody {
            error: "Rate limit exceeded".to_string(),
            authenticated: rejected.authenticated,
            limit: rejected.limit,
            remaining: 0,
        }),
    )
        .into_response();

    let headers = response.headers_mut();
    for (name, value) in rate_limit_headers(&rejected, true) {
        headers.insert(name, value);
    }
    response
}

impl IntoResponse for FluencyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            Self::RateLimited(result) => rate_limit_response(result),
            Self::Upstream { body, .. } => {
                (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
            }
            Self::UpstreamUnreachable(msg) | Self::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (status, Json(ErrorBody { error: msg })).into_response()
            }
            other => (status, Json(ErrorBody { error: other.to_string() })).into_response(),
        }
    }
}
