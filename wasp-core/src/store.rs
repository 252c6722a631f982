// src/store.rs
//! Store owns the ONLY SQLite connection in the process.
//!
//! - WAL journal mode (one writer, many readers) with a 5 s busy timeout.
//! - `ensure_schema` is idempotent; repeating `init` is a no-op.
//! - Every mutating call runs as its own transaction; rusqlite wraps single
//!   statements in implicit transactions, and multi-statement operations
//!   take an explicit one.
//! - All queries are parameterized. No caller-supplied value is ever
//!   concatenated into SQL text.
//!
//! Concern modules (contacts, audit, quarantine, canary) own their tables
//! and run their SQL through [`Store::with_conn`]; the connection mutex
//! keeps two transactions from interleaving writes on one handle.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;

use crate::config::DB_FILE;
use crate::errors::{Error, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Schema version recorded in the `meta` table; bump on migration.
pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug)]
pub struct Store {
    conn: Mutex<Option<Connection>>,
}

impl Store {
    /// Open (creating if needed) the database under `data_dir` and ensure
    /// the schema. The parent directory is created when missing.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join(DB_FILE))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Mutex::new(Some(conn)),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Open an existing database, failing with `NotInitialized` when no
    /// store has been created under `data_dir` yet.
    pub fn open_existing(data_dir: &Path) -> Result<Self> {
        if !data_dir.join(DB_FILE).exists() {
            return Err(Error::NotInitialized);
        }
        Self::open(data_dir)
    }

    /// True when a database file already exists under `data_dir`.
    pub fn is_initialized(data_dir: &Path) -> bool {
        data_dir.join(DB_FILE).exists()
    }

    /// Run `f` against the live connection, holding the handle's mutual
    /// exclusion for the duration. Fails with `NotInitialized` after
    /// [`Store::close`].
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| Error::Storage("connection mutex poisoned".into()))?;
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(Error::NotInitialized),
        }
    }

    /// Idempotent schema creation. Safe to call on every open.
    fn ensure_schema(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
                PRAGMA journal_mode = WAL;

                CREATE TABLE IF NOT EXISTS contacts (
                  id          INTEGER PRIMARY KEY AUTOINCREMENT,
                  identifier  TEXT NOT NULL,     -- opaque, byte-exact
                  platform    TEXT NOT NULL,
                  trust       TEXT NOT NULL,     -- sovereign | trusted | limited
                  name        TEXT,
                  notes       TEXT,
                  created_at  TEXT NOT NULL,     -- RFC3339 UTC
                  UNIQUE(identifier, platform)
                );

                CREATE TABLE IF NOT EXISTS audit_log (
                  id          INTEGER PRIMARY KEY AUTOINCREMENT,
                  ts          TEXT NOT NULL,
                  identifier  TEXT NOT NULL,
                  platform    TEXT NOT NULL,
                  decision    TEXT NOT NULL,     -- allow | deny | limited
                  reason      TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_ts ON audit_log(ts);

                CREATE TABLE IF NOT EXISTS quarantine (
                  id          INTEGER PRIMARY KEY AUTOINCREMENT,
                  identifier  TEXT NOT NULL,
                  platform    TEXT NOT NULL,
                  preview     TEXT NOT NULL,
                  body        TEXT NOT NULL,
                  created_at  TEXT NOT NULL,
                  reviewed    INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_quarantine_sender
                  ON quarantine(identifier, platform);

                CREATE TABLE IF NOT EXISTS canary_hits (
                  id          INTEGER PRIMARY KEY AUTOINCREMENT,
                  identifier  TEXT NOT NULL,
                  platform    TEXT NOT NULL,
                  score       REAL NOT NULL,
                  patterns    TEXT NOT NULL,     -- JSON array, match order
                  verbs       TEXT NOT NULL,     -- JSON array, match order
                  preview     TEXT NOT NULL,
                  ts          TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_canary_ts ON canary_hits(ts);

                CREATE TABLE IF NOT EXISTS meta (
                  key         TEXT PRIMARY KEY,
                  value       TEXT NOT NULL
                );
                "#,
            )?;
            conn.execute(
                "INSERT INTO meta(key, value) VALUES ('schema_version', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [SCHEMA_VERSION.to_string()],
            )?;
            Ok(())
        })
    }

    /// Schema version recorded in the store.
    pub fn schema_version(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let v: String = conn.query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )?;
            v.parse::<i64>()
                .map_err(|e| Error::Storage(format!("corrupt schema_version: {e}")))
        })
    }

    /// Close the handle. Subsequent calls fail with `NotInitialized`;
    /// a fresh [`Store::open`] on the same directory is permitted.
    pub fn close(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| Error::Storage("connection mutex poisoned".into()))?;
        if let Some(conn) = guard.take() {
            // rusqlite hands the connection back on failure; drop it either way.
            conn.close().map_err(|(_, e)| Error::from(e))?;
        }
        Ok(())
    }
}
