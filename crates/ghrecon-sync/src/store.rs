//! Shared database handle.
//!
//! The schema itself is owned by the bulk importer; this layer only
//! assumes the `gha_*` tables exist with their uniqueness constraints
//! in place. The connection is shared behind a mutex; a worker holds
//! the lock for the duration of one probe query or one writer
//! transaction.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use ghrecon_core::timefmt::to_ymd_hms;
use rusqlite::Connection;
use thiserror::Error;

/// Errors surfaced by the storage layer.
///
/// Storage is the single source of truth; callers treat every variant
/// as fatal (continuing past a write failure would corrupt future diff
/// decisions).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Driver-level error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The connection mutex was poisoned by a panicking worker.
    #[error("connection mutex poisoned")]
    Poisoned,
}

/// Shared handle to the analytics database.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Wraps an already-open connection. The caller may keep clones of
    /// the `Arc` for out-of-band access (tests do).
    #[must_use]
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Opens the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    /// Opens an in-memory database (tests and dry runs).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be created.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Lists the distinct repository names with events after the given
    /// cutoff.
    ///
    /// # Errors
    ///
    /// Returns an error on any driver failure.
    pub fn recent_repos(&self, since: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("select distinct dup_repo_name from gha_events where created_at > ?1")?;
        let rows = stmt.query_map([to_ymd_hms(since)], |row| row.get::<_, String>(0))?;
        let mut repos = Vec::new();
        for repo in rows {
            repos.push(repo?);
        }
        Ok(repos)
    }
}
