//! SQLite store for cached document lists.

use super::{CacheEntry, CacheKey, CacheStats, DocumentListStore};
use crate::error::{DataError, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed [`DocumentListStore`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a cache database.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DataError::Cache("cache connection lock poisoned".to_string()))
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        // WAL keeps readers consistent if a writer is interrupted
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS document_lists (
                list_date TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                payload BLOB NOT NULL,
                retrieved_at TEXT NOT NULL,
                PRIMARY KEY (list_date, fingerprint)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_document_lists_retrieved
             ON document_lists(retrieved_at)",
            [],
        )?;

        Ok(())
    }
}

fn parse_timestamp(text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

impl DocumentListStore for SqliteStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                "SELECT payload, retrieved_at FROM document_lists
                 WHERE list_date = ?1 AND fingerprint = ?2",
                params![key.date.to_string(), key.fingerprint.as_str()],
                |row| {
                    Ok(CacheEntry {
                        payload: row.get(0)?,
                        retrieved_at: parse_timestamp(&row.get::<_, String>(1)?)?,
                    })
                },
            )
            .optional()?;

        Ok(result)
    }

    fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO document_lists (list_date, fingerprint, payload, retrieved_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                key.date.to_string(),
                key.fingerprint.as_str(),
                entry.payload,
                entry.retrieved_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM document_lists", [])?)
    }

    fn sweep_expired(&self, ttl: Duration, now: DateTime<Utc>) -> Result<usize> {
        // Nothing can be older than a cutoff before the representable range.
        let Some(cutoff) = now.checked_sub_signed(ttl) else {
            return Ok(0);
        };
        let cutoff = cutoff.to_rfc3339();
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM document_lists WHERE retrieved_at <= ?1",
            params![cutoff],
        )?)
    }

    fn stats(&self) -> Result<CacheStats> {
        let conn = self.conn()?;
        let (entries, distinct_dates, payload_bytes, oldest, newest): (
            i64,
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT list_date), COALESCE(SUM(LENGTH(payload)), 0),
                    MIN(retrieved_at), MAX(retrieved_at)
             FROM document_lists",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        Ok(CacheStats {
            entries: entries as usize,
            distinct_dates: distinct_dates as usize,
            payload_bytes: payload_bytes as u64,
            oldest: oldest.as_deref().map(parse_timestamp).transpose()?,
            newest: newest.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    fn is_persistent(&self) -> bool {
        true
    }
}
