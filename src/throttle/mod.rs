//! Daily usage throttle for AI endpoints.
//!
//! Every call that wants to reach the LLM API passes through
//! [`UsageThrottle::check_and_increment`]. Counts are kept per identity and
//! per UTC calendar day; the backing store is injected so the same decision
//! logic runs over memory, SQLite or the Supabase RPC.
//!
//! Policy: deny only on a confirmed over-limit count. A store error never
//! denies a request.

mod memory;
mod remote;
mod sqlite;
#[cfg(test)]
mod tests;

pub use memory::MemoryCounter;
pub use remote::SupabaseCounter;
pub use sqlite::SqliteCounter;

use crate::config::{Config, CounterStoreKind, LimitsConfig};
use crate::identity::Identity;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Limit reported while the throttle is bypassed in development mode.
pub const DEVELOPMENT_LIMIT: u32 = 999;

/// Outcome of a single throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub authenticated: bool,
    pub remaining: u32,
    pub limit: u32,
}

impl RateLimitResult {
    fn from_count(count: u32, limit: u32, authenticated: bool) -> Self {
        Self {
            allowed: count <= limit,
            authenticated,
            remaining: limit.saturating_sub(count),
            limit,
        }
    }

    fn fail_open(limit: u32, authenticated: bool) -> Self {
        Self {
            allowed: true,
            authenticated,
            remaining: limit,
            limit,
        }
    }
}

/// Error from a counter store.
#[derive(Debug, Clone)]
pub enum CounterError {
    /// Local store failure (lock poisoning, SQLite).
    Store(String),
    /// Remote counter returned an error or an unexpected payload.
    Remote(String),
}

impl fmt::Display for CounterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(msg) => write!(f, "Counter store error: {}", msg),
            Self::Remote(msg) => write!(f, "Remote counter error: {}", msg),
        }
    }
}

impl std::error::Error for CounterError {}

impl From<rusqlite::Error> for CounterError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

/// A per-day counter with an atomic increment.
///
/// `increment` bumps the count for `(key, day)` and returns the new value.
/// The first call for a key on a new day returns 1.
#[async_trait]
pub trait UsageCounter: Send + Sync {
    async fn increment(&self, key: &str, day: &str) -> Result<u32, CounterError>;
}

/// Per-identity daily ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub anonymous: u32,
    pub authenticated: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for Limits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            anonymous: config.anonymous_daily,
            authenticated: config.authenticated_daily,
        }
    }
}

/// Current UTC date as `YYYY-MM-DD`.
pub fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Decides whether an AI call may proceed.
#[derive(Clone)]
pub struct UsageThrottle {
    limits: Limits,
    bypass: bool,
    anonymous: Arc<dyn UsageCounter>,
    authenticated: Arc<dyn UsageCounter>,
}

impl UsageThrottle {
    pub fn new(
        limits: Limits,
        anonymous: Arc<dyn UsageCounter>,
        authenticated: Arc<dyn UsageCounter>,
    ) -> Self {
        Self {
            limits,
            bypass: false,
            anonymous,
            authenticated,
        }
    }

    /// Throttle backed entirely by process memory.
    pub fn in_memory(limits: Limits) -> Self {
        Self::new(
            limits,
            Arc::new(MemoryCounter::new()),
            Arc::new(MemoryCounter::new()),
        )
    }

    /// Build the throttle described by the config.
    ///
    /// Anonymous counts always live in memory; the authenticated store
    /// follows `limits.store`.
    pub fn from_config(config: &Config) -> Result<Self, CounterError> {
        let limits = Limits::from(&config.limits);
        let authenticated: Arc<dyn UsageCounter> = match config.limits.store {
            CounterStoreKind::Memory => Arc::new(MemoryCounter::new()),
            CounterStoreKind::Sqlite => {
                Arc::new(SqliteCounter::open(config.limits.sqlite_path.clone())?)
            }
            CounterStoreKind::Supabase => Arc::new(SupabaseCounter::from_config(&config.supabase)?),
        };

        Ok(Self::new(limits, Arc::new(MemoryCounter::new()), authenticated)
            .with_bypass(config.is_development()))
    }

    /// Skip counting entirely (development mode).
    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Count one call for `identity` today and decide.
    pub async fn check_and_increment(&self, identity: &Identity) -> RateLimitResult {
        self.check_and_increment_on(identity, &today_utc()).await
    }

    /// Count one call for `identity` on `day` (`YYYY-MM-DD`) and decide.
    pub async fn check_and_increment_on(&self, identity: &Identity, day: &str) -> RateLimitResult {
        if self.bypass {
            return RateLimitResult {
                allowed: true,
                authenticated: true,
                remaining: DEVELOPMENT_LIMIT,
                limit: DEVELOPMENT_LIMIT,
            };
        }

        let (store, limit, authenticated) = match identity {
            Identity::User(_) => (&self.authenticated, self.limits.authenticated, true),
            Identity::Anonymous(_) => (&self.anonymous, self.limits.anonymous, false),
        };

        match store.increment(identity.key(), day).await {
            Ok(count) => {
                let result = RateLimitResult::from_count(count, limit, authenticated);
                if !result.allowed {
                    tracing::info!(
                        authenticated,
                        count,
                        limit,
                        "Daily AI usage limit reached"
                    );
                }
                result
            }
            Err(e) => {
                tracing::warn!(authenticated, error = %e, "Usage counter failed, allowing request");
                RateLimitResult::fail_open(limit, authenticated)
            }
        }
    }
}
