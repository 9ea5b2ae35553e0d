//! SQLite-backed shared container.
//!
//! Both execution domains open the same database file. There is no
//! cross-process locking beyond what SQLite does per statement; a short busy
//! timeout keeps a write from the other process from stalling the caller.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::migrations;
use super::SharedStore;
use crate::error::{DatabaseError, Result};

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Key/value rows of one shared container inside a SQLite file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    container: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`, scoped to `container`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>, container: &str) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| DatabaseError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        Self::with_connection(conn, container)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory(container: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, container)
    }

    fn with_connection(conn: Connection, container: &str) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrations::migrate(&conn, container)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            container: container.to_string(),
        })
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SharedStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT value FROM shared_kv WHERE container = ?1 AND key = ?2",
                params![self.container, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO shared_kv (container, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![self.container, key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM shared_kv WHERE container = ?1 AND key = ?2",
            params![self.container, key],
        )?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key FROM shared_kv
             WHERE container = ?1 AND substr(key, 1, length(?2)) = ?2
             ORDER BY key",
        )?;
        let rows = stmt.query_map(params![self.container, prefix], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_store() {
        let store = SqliteStore::open_memory("group.test").unwrap();
        assert!(store.get("test").unwrap().is_none());
        store.set("test", "hello").unwrap();
        assert_eq!(store.get("test").unwrap().unwrap(), "hello");
        store.set("test", "again").unwrap();
        assert_eq!(store.get("test").unwrap().unwrap(), "again");
        store.remove("test").unwrap();
        assert!(store.get("test").unwrap().is_none());
    }

    #[test]
    fn prefix_listing_is_sorted_and_literal() {
        let store = SqliteStore::open_memory("group.test").unwrap();
        store.set("summary.2026-03-02", "{}").unwrap();
        store.set("summary.2026-03-01", "{}").unwrap();
        store.set("summary_other", "{}").unwrap();
        store.set("usage.today", "{}").unwrap();
        assert_eq!(
            store.keys_with_prefix("summary.").unwrap(),
            vec!["summary.2026-03-01", "summary.2026-03-02"]
        );
    }

    #[test]
    fn two_handles_on_one_file_see_each_others_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let foreground = SqliteStore::open(&path, "group.test").unwrap();
        let background = SqliteStore::open(&path, "group.test").unwrap();

        foreground.set("limits.current", "v1").unwrap();
        assert_eq!(background.get("limits.current").unwrap().as_deref(), Some("v1"));

        background.set("limits.current", "v2").unwrap();
        assert_eq!(foreground.get("limits.current").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn containers_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let a = SqliteStore::open(&path, "group.a").unwrap();
        let b = SqliteStore::open(&path, "group.b").unwrap();
        a.set("k", "a").unwrap();
        assert!(b.get("k").unwrap().is_none());
    }
}
