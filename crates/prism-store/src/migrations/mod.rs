//! Schema migration runner.
//!
//! Migrations are embedded at compile time via [`include_str!`] and executed
//! in version order. Each migration runs inside its own transaction — a
//! failure rolls back cleanly, leaving the store at its last committed
//! version, and surfaces a fatal [`StoreError::Migration`].
//!
//! The `schema_version` table tracks which migrations have been applied.
//! Running the migrator is idempotent: already-applied versions are skipped.
//! There is no downgrade path.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};

/// A single migration with a version number and SQL to execute.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in version order.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Core schema — providers, sessions, columns, messages, message FTS",
        sql: include_str!("v001_schema.sql"),
    },
    Migration {
        version: 2,
        description: "Query history table and history FTS",
        sql: include_str!("v002_history.sql"),
    },
];

/// Run all pending migrations on the given connection.
///
/// Creates the `schema_version` table if it doesn't exist, then applies each
/// migration whose version exceeds the current maximum, in ascending order.
/// Returns the number of migrations applied (0 on an up-to-date store).
///
/// # Errors
///
/// Returns [`StoreError::Migration`] if any migration SQL fails.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version <= current {
            debug!(
                version = migration.version,
                description = migration.description,
                "migration already applied, skipping"
            );
            continue;
        }

        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );

        apply_migration(conn, migration)?;
        applied += 1;
    }

    if applied > 0 {
        info!(applied, "migrations complete");
    }

    Ok(applied)
}

/// Return the highest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Migration {
            message: format!("failed to read schema_version: {e}"),
        })?;
    Ok(version)
}

/// Return the latest migration version defined in code.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal
// ─────────────────────────────────────────────────────────────────────────────

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
           version     INTEGER PRIMARY KEY,
           applied_at  TEXT    NOT NULL,
           description TEXT
         );",
    )
    .map_err(|e| StoreError::Migration {
        message: format!("failed to create schema_version table: {e}"),
    })?;
    Ok(())
}

fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| StoreError::Migration {
            message: format!(
                "failed to begin transaction for v{}: {e}",
                migration.version
            ),
        })?;

    tx.execute_batch(migration.sql)
        .map_err(|e| StoreError::Migration {
            message: format!(
                "migration v{} ({}) failed: {e}",
                migration.version, migration.description
            ),
        })?;

    let _ = tx
        .execute(
            "INSERT INTO schema_version (version, applied_at, description) VALUES (?1, datetime('now'), ?2)",
            rusqlite::params![migration.version, migration.description],
        )
        .map_err(|e| StoreError::Migration {
            message: format!(
                "failed to record v{} in schema_version: {e}",
                migration.version
            ),
        })?;

    tx.commit().map_err(|e| StoreError::Migration {
        message: format!("failed to commit v{}: {e}", migration.version),
    })?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn open_memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn run_migrations_creates_all_tables() {
        let conn = open_memory();
        let applied = run_migrations(&conn).unwrap();
        assert_eq!(applied, 2);

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "providers",
            "sessions",
            "session_columns",
            "messages",
            "messages_fts",
            "history",
            "history_fts",
            "schema_version",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table: {table}");
        }
    }

    #[test]
    fn run_migrations_is_idempotent() {
        let conn = open_memory();
        assert_eq!(run_migrations(&conn).unwrap(), 2);
        assert_eq!(run_migrations(&conn).unwrap(), 0);
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn current_version_starts_at_zero() {
        let conn = open_memory();
        ensure_version_table(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);
    }

    #[test]
    fn latest_version_matches_migrations() {
        assert_eq!(latest_version(), 2);
    }

    #[test]
    fn schema_version_records_descriptions() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();

        let desc: String = conn
            .query_row(
                "SELECT description FROM schema_version WHERE version = 2",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(desc.contains("history"));
    }

    #[test]
    fn single_active_provider_index_enforced() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO providers (id, name, kind, model, is_active, display_order, created_at, updated_at)
             VALUES ('p1', 'A', 'openai', 'gpt-4o-mini', 1, 0, '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let second_active = conn.execute(
            "INSERT INTO providers (id, name, kind, model, is_active, display_order, created_at, updated_at)
             VALUES ('p2', 'B', 'anthropic', 'claude', 1, 1, '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        );
        assert!(second_active.is_err());
    }

    #[test]
    fn provider_delete_nulls_column_reference() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO providers (id, name, kind, model, is_active, display_order, created_at, updated_at)
             VALUES ('p1', 'A', 'openai', 'gpt-4o-mini', 0, 0, '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO sessions (id, title, created_at, updated_at)
             VALUES ('s1', 'Test', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO session_columns (id, session_id, provider_id, position, created_at, updated_at)
             VALUES ('c1', 's1', 'p1', 0, '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM providers WHERE id = 'p1'", [])
            .unwrap();

        let provider_id: Option<String> = conn
            .query_row(
                "SELECT provider_id FROM session_columns WHERE id = 'c1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(provider_id.is_none());
    }

    #[test]
    fn session_delete_cascades_to_columns_and_messages() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO sessions (id, title, created_at, updated_at)
             VALUES ('s1', 'Test', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO session_columns (id, session_id, position, created_at, updated_at)
             VALUES ('c1', 's1', 0, '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO messages (id, column_id, role, body, sequence, created_at)
             VALUES ('m1', 'c1', 'user', 'hello', 0, '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM sessions WHERE id = 's1'", [])
            .unwrap();

        let messages: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(messages, 0);
    }

    #[test]
    fn fts_trigger_fires_on_message_insert() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO sessions (id, title, created_at, updated_at)
             VALUES ('s1', 'Test', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO session_columns (id, session_id, position, created_at, updated_at)
             VALUES ('c1', 's1', 0, '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO messages (id, column_id, role, body, sequence, created_at)
             VALUES ('m1', 'c1', 'user', 'the quick brown fox', 0, '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages_fts WHERE messages_fts MATCH 'quick'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        conn.execute("DELETE FROM messages WHERE id = 'm1'", [])
            .unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages_fts WHERE messages_fts MATCH 'quick'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn duplicate_sequence_in_column_rejected() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO sessions (id, title, created_at, updated_at)
             VALUES ('s1', 'Test', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO session_columns (id, session_id, position, created_at, updated_at)
             VALUES ('c1', 's1', 0, '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO messages (id, column_id, role, body, sequence, created_at)
             VALUES ('m1', 'c1', 'user', 'hi', 0, '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let duplicate = conn.execute(
            "INSERT INTO messages (id, column_id, role, body, sequence, created_at)
             VALUES ('m2', 'c1', 'assistant', 'hello', 0, '2025-01-01T00:00:00Z')",
            [],
        );
        assert!(duplicate.is_err());
    }
}
