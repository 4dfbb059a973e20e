//! SQLite-backed counter shared by processes on one host.

use super::{CounterError, UsageCounter};
use async_trait::async_trait;
use rusqlite::{params, Connection, Result as SqlResult};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Usage counts persisted to SQLite, one row per (identity, day).
pub struct SqliteCounter {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCounter {
    /// Open (or create) the counter database at `db_path`.
    pub fn open(db_path: PathBuf) -> Result<Self, CounterError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CounterError::Store(e.to_string()))?;
        }
        let conn = Connection::open(&db_path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory counter for testing.
    pub fn in_memory() -> Result<Self, CounterError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> SqlResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ai_usage (
                identity TEXT NOT NULL,
                day TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (identity, day)
            )",
            [],
        )?;
        Ok(())
    }

    /// Stored count for `(key, day)`, zero when absent.
    pub fn count(&self, key: &str, day: &str) -> Result<u32, CounterError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CounterError::Store(e.to_string()))?;
        let count: Option<i64> = conn
            .query_row(
                "SELECT count FROM ai_usage WHERE identity = ?1 AND day = ?2",
                params![key, day],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(count.unwrap_or(0).clamp(0, u32::MAX as i64) as u32)
    }
}

#[async_trait]
impl UsageCounter for SqliteCounter {
    async fn increment(&self, key: &str, day: &str) -> Result<u32, CounterError> {
        let conn = Arc::clone(&self.conn);
        let (key, day) = (key.to_string(), day.to_string());

        tokio::task::spawn_blocking(move || -> Result<u32, CounterError> {
            let conn = conn.lock().map_err(|e| CounterError::Store(e.to_string()))?;

            // Single statement, so concurrent writers cannot lose an update
            let count: i64 = conn.query_row(
                "INSERT INTO ai_usage (identity, day, count) VALUES (?1, ?2, 1)
                 ON CONFLICT(identity, day) DO UPDATE SET count = count + 1
                 RETURNING count",
                params![key, day],
                |row| row.get(0),
            )?;

            Ok(count.clamp(0, u32::MAX as i64) as u32)
        })
        .await
        .map_err(|e| CounterError::Store(e.to_string()))?
    }
}
