//! In-process counter for single-instance deployments.

use super::{CounterError, UsageCounter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
struct UsageEntry {
    count: u32,
    day: String,
}

/// Process-wide map of key → (count, day).
///
/// Entries are replaced, never evicted: a key seen on a new day starts over
/// at 1 and the old day's count is dropped.
#[derive(Debug, Default)]
pub struct MemoryCounter {
    entries: Mutex<HashMap<String, UsageEntry>>,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UsageCounter for MemoryCounter {
    async fn increment(&self, key: &str, day: &str) -> Result<u32, CounterError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CounterError::Store(format!("usage map lock poisoned: {}", e)))?;

        match entries.get_mut(key) {
            Some(entry) if entry.day == day => {
                entry.count = entry.count.saturating_add(1);
                Ok(entry.count)
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    UsageEntry {
                        count: 1,
                        day: day.to_string(),
                    },
                );
                Ok(1)
            }
        }
    }
}
