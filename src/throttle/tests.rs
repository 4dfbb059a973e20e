//! Tests for the usage throttle decision logic.

use super::*;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Counter that replays a fixed script of results.
struct ScriptedCounter {
    script: Mutex<VecDeque<Result<u32, CounterError>>>,
    calls: Mutex<u32>,
}

impl ScriptedCounter {
    fn new(script: impl IntoIterator<Item = Result<u32, CounterError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl UsageCounter for ScriptedCounter {
    async fn increment(&self, _key: &str, _day: &str) -> Result<u32, CounterError> {
        *self.calls.lock().unwrap() += 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CounterError::Store("script exhausted".to_string())))
    }
}

fn anon(addr: &str) -> Identity {
    Identity::Anonymous(addr.to_string())
}

fn user(id: &str) -> Identity {
    Identity::User(id.to_string())
}

// =========================================================================
// Anonymous path
// =========================================================================

#[tokio::test]
async fn anonymous_gets_five_calls_per_day() {
    let throttle = UsageThrottle::in_memory(Limits::default());
    let id = anon("203.0.113.9");

    let mut remaining = Vec::new();
    for _ in 0..5 {
        let result = throttle.check_and_increment_on(&id, "2026-03-01").await;
        assert!(result.allowed);
        assert!(!result.authenticated);
        assert_eq!(result.limit, 5);
        remaining.push(result.remaining);
    }
    assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

    let sixth = throttle.check_and_increment_on(&id, "2026-03-01").await;
    assert!(!sixth.allowed);
    assert_eq!(sixth.remaining, 0);
}

#[tokio::test]
async fn anonymous_remaining_never_goes_negative() {
    let throttle = UsageThrottle::in_memory(Limits::default());
    let id = anon("203.0.113.9");

    for _ in 0..12 {
        throttle.check_and_increment_on(&id, "2026-03-01").await;
    }
    let result = throttle.check_and_increment_on(&id, "2026-03-01").await;
    assert!(!result.allowed);
    assert_eq!(result.remaining, 0);
}

#[tokio::test]
async fn anonymous_count_resets_on_new_utc_day() {
    let throttle = UsageThrottle::in_memory(Limits::default());
    let id = anon("203.0.113.9");

    for _ in 0..6 {
        throttle.check_and_increment_on(&id, "2026-03-01").await;
    }

    let next_day = throttle.check_and_increment_on(&id, "2026-03-02").await;
    assert!(next_day.allowed);
    assert_eq!(next_day.remaining, 4);
}

#[tokio::test]
async fn anonymous_addresses_do_not_share_quota() {
    let throttle = UsageThrottle::in_memory(Limits::default());

    for _ in 0..6 {
        throttle.check_and_increment_on(&anon("a"), "2026-03-01").await;
    }
    let other = throttle.check_and_increment_on(&anon("b"), "2026-03-01").await;
    assert!(other.allowed);
    assert_eq!(other.remaining, 4);
}

#[tokio::test]
async fn anonymous_store_error_fails_open() {
    let failing = Arc::new(ScriptedCounter::new([Err(CounterError::Store(
        "poisoned".to_string(),
    ))]));
    let throttle = UsageThrottle::new(Limits::default(), failing, Arc::new(MemoryCounter::new()));

    let result = throttle.check_and_increment_on(&anon("a"), "2026-03-01").await;
    assert!(result.allowed);
    assert!(!result.authenticated);
    assert_eq!(result.remaining, 5);
}

// =========================================================================
// Authenticated path
// =========================================================================

#[tokio::test]
async fn authenticated_ceiling_is_fifty() {
    let counter = Arc::new(ScriptedCounter::new((1..=51).map(Ok)));
    let throttle = UsageThrottle::new(
        Limits::default(),
        Arc::new(MemoryCounter::new()),
        counter.clone(),
    );
    let id = user("user-1");

    for call in 1..=50u32 {
        let result = throttle.check_and_increment_on(&id, "2026-03-01").await;
        assert!(result.allowed, "call {} should be allowed", call);
        assert!(result.authenticated);
        assert_eq!(result.remaining, 50 - call);
        assert_eq!(result.limit, 50);
    }

    let last = throttle.check_and_increment_on(&id, "2026-03-01").await;
    assert!(!last.allowed);
    assert_eq!(last.remaining, 0);
    assert_eq!(counter.calls(), 51);
}

#[tokio::test]
async fn authenticated_counter_error_fails_open() {
    let counter = Arc::new(ScriptedCounter::new([Err(CounterError::Remote(
        "503".to_string(),
    ))]));
    let throttle = UsageThrottle::new(Limits::default(), Arc::new(MemoryCounter::new()), counter);

    let result = throttle.check_and_increment_on(&user("user-1"), "2026-03-01").await;
    assert_eq!(
        result,
        RateLimitResult {
            allowed: true,
            authenticated: true,
            remaining: 50,
            limit: 50,
        }
    );
}

#[tokio::test]
async fn each_check_increments_exactly_once() {
    let anon_counter = Arc::new(ScriptedCounter::new([Ok(1), Ok(2)]));
    let user_counter = Arc::new(ScriptedCounter::new([Ok(1)]));
    let throttle = UsageThrottle::new(Limits::default(), anon_counter.clone(), user_counter.clone());

    throttle.check_and_increment_on(&anon("a"), "2026-03-01").await;
    throttle.check_and_increment_on(&anon("a"), "2026-03-01").await;
    throttle.check_and_increment_on(&user("u"), "2026-03-01").await;

    assert_eq!(anon_counter.calls(), 2);
    assert_eq!(user_counter.calls(), 1);
}

#[tokio::test]
async fn authenticated_sqlite_store_enforces_limit() {
    let limits = Limits {
        anonymous: 5,
        authenticated: 3,
    };
    let throttle = UsageThrottle::new(
        limits,
        Arc::new(MemoryCounter::new()),
        Arc::new(SqliteCounter::in_memory().unwrap()),
    );
    let id = user("user-1");

    for _ in 0..3 {
        assert!(throttle.check_and_increment_on(&id, "2026-03-01").await.allowed);
    }
    assert!(!throttle.check_and_increment_on(&id, "2026-03-01").await.allowed);
}

// =========================================================================
// Development bypass
// =========================================================================

#[tokio::test]
async fn development_mode_bypasses_counting() {
    let counter = Arc::new(ScriptedCounter::new(std::iter::empty()));
    let throttle = UsageThrottle::new(Limits::default(), counter.clone(), counter.clone())
        .with_bypass(true);

    for _ in 0..10 {
        let result = throttle.check_and_increment_on(&anon("a"), "2026-03-01").await;
        assert!(result.allowed);
        assert_eq!(result.remaining, DEVELOPMENT_LIMIT);
        assert_eq!(result.limit, DEVELOPMENT_LIMIT);
    }
    assert_eq!(counter.calls(), 0);
}

#[test]
fn today_utc_is_iso_date() {
    let today = today_utc();
    assert_eq!(today.len(), 10);
    assert!(chrono::NaiveDate::parse_from_str(&today, "%Y-%m-%d").is_ok());
}

#[test]
fn from_config_builds_development_bypass() {
    let mut config = Config::default();
    config.app.mode = crate::config::RunMode::Development;

    let throttle = UsageThrottle::from_config(&config).unwrap();
    assert!(throttle.bypass);
    assert_eq!(throttle.limits(), Limits::default());
}
