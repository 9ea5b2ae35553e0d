//! Database schema migrations for the shared container database.
//!
//! Migrations are versioned and applied automatically when the store opens.
//! The `schema_version` table tracks the current migration version. Both
//! execution domains may open the file first, so every step is safe to race:
//! DDL uses `IF NOT EXISTS` and each step runs in its own transaction.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations.
///
/// `container` names the namespace that pre-namespace rows are moved into.
///
/// # Errors
/// Returns an error if a migration step fails.
pub fn migrate(conn: &Connection, container: &str) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn, container)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub(crate) fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i32>>(0)
    })
    .map(|v| v.unwrap_or(0))
    .unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to read schema_version");
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: flat key/value table used before containers existed.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: namespace rows by shared container and stamp writes.
///
/// Existing flat rows are moved into `container`.
fn migrate_v2(conn: &Connection, container: &str) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS shared_kv (
            container  TEXT NOT NULL,
            key        TEXT NOT NULL,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (container, key)
        );
        CREATE INDEX IF NOT EXISTS idx_shared_kv_container ON shared_kv(container);",
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO shared_kv (container, key, value)
         SELECT ?1, key, value FROM kv",
        [container],
    )?;
    tx.execute("DELETE FROM kv", [])?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, "group.test").unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM shared_kv", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_migrate_moves_flat_rows_into_container() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY);
             INSERT INTO schema_version (version) VALUES (1);
             CREATE TABLE kv (key TEXT PRIMARY KEY, value TEXT NOT NULL);
             INSERT INTO kv (key, value) VALUES ('limits.current', '{}');",
        )
        .unwrap();

        migrate(&conn, "group.test").unwrap();

        let value: String = conn
            .query_row(
                "SELECT value FROM shared_kv WHERE container = 'group.test' AND key = 'limits.current'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value, "{}");
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, "group.test").unwrap();
        migrate(&conn, "group.test").unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }
}
