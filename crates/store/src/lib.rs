//! Relational persistence for the cognitive runtime.
//!
//! One SQLite database holds every durable artifact: the raw chat log,
//! personality state and history, knowledge, episodes, the curiosity queue,
//! goals, journal entries, and the various activity logs. SQL never leaves
//! this crate — engines call typed operations and the schema is migrated
//! in place on open.

mod migrate;
pub mod secret;

pub mod activity;
pub mod adaptation;
pub mod awareness;
pub mod consolidation;
pub mod curiosity;
pub mod episodes;
pub mod goals;
pub mod interests;
pub mod journal;
pub mod knowledge;
pub mod messages;
pub mod outputs;
pub mod threads;
pub mod traits;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use rusqlite::{Connection, Transaction};
use tracing::info;

pub use secret::SecretBox;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Process-wide store handle. Writes serialize on the inner mutex; every
/// multi-statement write goes through [`Store::tx`].
pub struct Store {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Store {
    /// Open (or create) the database at `path` and run schema migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate::run(&conn)?;

        info!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// In-memory store for tests. Same schema as on disk.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrate::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a read-only closure against the connection.
    pub(crate) fn with<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        Ok(f(&conn)?)
    }

    /// Run `f` inside a transaction: committed on `Ok`, rolled back on error.
    pub fn tx<T>(&self, f: impl FnOnce(&Transaction) -> rusqlite::Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Local wall-clock timestamp in the ISO-8601 shape every table stores.
/// Lexicographic comparison of these strings matches chronological order.
pub fn now_iso() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Today's date as `YYYY-MM-DD`.
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_dirs_and_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("data/databases/evolution.db")).unwrap();
        // Seeded traits prove migrations ran.
        let traits = store.load_traits().unwrap();
        assert_eq!(traits.len(), 10);
        assert_eq!(traits.get("verbosity"), Some(&0.5));
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evolution.db");
        drop(Store::open(&path).unwrap());
        // Second open re-runs every CREATE/ALTER without error.
        let store = Store::open(&path).unwrap();
        assert_eq!(store.load_traits().unwrap().len(), 10);
    }

    #[test]
    fn tx_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<()> = store.tx(|tx| {
            tx.execute(
                "INSERT INTO activity_log (timestamp, type, label, detail) VALUES ('t', 'x', 'l', 'd')",
                [],
            )?;
            Err(rusqlite::Error::QueryReturnedNoRows)
        });
        assert!(result.is_err());
        assert!(store.recent_activity(10).unwrap().is_empty());
    }

    #[test]
    fn now_iso_sorts_chronologically() {
        let a = now_iso();
        let b = now_iso();
        assert!(a <= b);
    }
}
