//! Terminal logging of AI calls with configurable verbosity levels.
//!
//! Supports three verbosity levels:
//! - Minimal: One-liner nginx-style
//! - Compact: Two lines, request and response arrows
//! - Verbose: Block with quota details

use crate::config::LogVerbosity;
use crate::identity::Identity;
use crate::throttle::RateLimitResult;

const SEPARATOR: &str = "────────────────────────────────────────";

/// What the gateway is about to proxy.
#[derive(Debug, Clone)]
pub struct AiCall<'a> {
    pub route: &'a str,
    pub identity: &'a Identity,
    pub model: &'a str,
    /// Feedback kind, for `/api/ai-feedback`.
    pub kind: Option<&'a str>,
}

/// How the call ended (or was refused).
#[derive(Debug, Clone, Copy)]
pub struct AiOutcome<'a> {
    pub status: u16,
    pub duration_ms: u64,
    pub quota: Option<&'a RateLimitResult>,
}

/// Format duration in human-readable form.
fn format_duration(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

fn identity_tag(identity: &Identity) -> &'static str {
    if identity.is_authenticated() {
        "user"
    } else {
        "anon"
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200..=299 => "OK",
        429 => "LIMITED",
        _ => "ERROR",
    }
}

fn remaining_text(quota: Option<&RateLimitResult>) -> String {
    quota
        .map(|q| format!("{} left", q.remaining))
        .unwrap_or_else(|| "-".to_string())
}

/// Format the start of a proxied call.
pub fn format_call_start(call: &AiCall<'_>, verbosity: &LogVerbosity) -> String {
    let tag = identity_tag(call.identity);
    let kind = call.kind.map(|k| format!(" {}", k)).unwrap_or_default();

    match verbosity {
        LogVerbosity::Minimal => format!("POST {} {}{}", call.route, tag, kind),
        LogVerbosity::Compact => format!("→ POST {} [{}]{}", call.route, tag, kind),
        LogVerbosity::Verbose => format!(
            "{}\nPOST {}\nIdentity: {} ({})\nModel: {}{}",
            SEPARATOR,
            call.route,
            tag,
            call.identity.key(),
            call.model,
            call.kind.map(|k| format!("\nKind: {}", k)).unwrap_or_default()
        ),
    }
}

/// Format the end of a proxied call.
pub fn format_call_end(outcome: &AiOutcome<'_>, verbosity: &LogVerbosity) -> String {
    let duration = format_duration(outcome.duration_ms);
    let remaining = remaining_text(outcome.quota);

    match verbosity {
        LogVerbosity::Minimal => format!("{} {} [{}]", outcome.status, duration, remaining),
        LogVerbosity::Compact => format!(
            "← {} {} ({}, {})",
            outcome.status,
            status_text(outcome.status),
            duration,
            remaining
        ),
        LogVerbosity::Verbose => {
            let limit = outcome
                .quota
                .map(|q| format!("{} of {}", q.remaining, q.limit))
                .unwrap_or_else(|| "-".to_string());
            format!(
                "Status: {} {}\nTiming: {} to first byte\nQuota: {} remaining\n{}",
                outcome.status,
                status_text(outcome.status),
                duration,
                limit,
                SEPARATOR
            )
        }
    }
}

/// Format a whole call on one go (used when the call is refused early).
pub fn format_call(call: &AiCall<'_>, outcome: &AiOutcome<'_>, verbosity: &LogVerbosity) -> String {
    let start = format_call_start(call, verbosity);
    let end = format_call_end(outcome, verbosity);
    match verbosity {
        LogVerbosity::Minimal => format!("{} {}", start, end),
        _ => format!("{}\n{}", start, end),
    }
}

pub fn log_call_start(call: &AiCall<'_>, verbosity: &LogVerbosity) {
    tracing::info!("{}", format_call_start(call, verbosity));
}

pub fn log_call_end(outcome: &AiOutcome<'_>, verbosity: &LogVerbosity) {
    tracing::info!("{}", format_call_end(outcome, verbosity));
}
