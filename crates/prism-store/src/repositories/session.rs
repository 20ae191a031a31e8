//! Session repository.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::{Result, StoreError};
use crate::row_types::SessionRow;
use crate::types::UpdateSession;
use prism_core::ids::SessionId;
use prism_core::time::now_rfc3339;

/// Fallback title for sessions created with a blank title.
const DEFAULT_TITLE: &str = "New session";

/// Session repository — stateless, every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session. Blank titles normalize to [`DEFAULT_TITLE`].
    pub fn create(
        conn: &Connection,
        title: &str,
        system_prompt: Option<&str>,
    ) -> Result<SessionRow> {
        let title = match title.trim() {
            "" => DEFAULT_TITLE,
            trimmed => trimmed,
        };
        let id = SessionId::new().into_inner();
        let now = now_rfc3339();
        let _ = conn.execute(
            "INSERT INTO sessions (id, title, system_prompt, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, title, system_prompt, now],
        )?;
        Ok(SessionRow {
            id,
            title: title.to_string(),
            system_prompt: system_prompt.map(String::from),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a session by ID.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<SessionRow>> {
        conn.query_row(
            "SELECT id, title, system_prompt, created_at, updated_at FROM sessions WHERE id = ?1",
            params![id],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Get a session by ID, failing if absent.
    pub fn get_required(conn: &Connection, id: &str) -> Result<SessionRow> {
        Self::get(conn, id)?.ok_or_else(|| StoreError::SessionNotFound(id.to_string()))
    }

    /// List sessions, most recently updated first.
    pub fn list(conn: &Connection) -> Result<Vec<SessionRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, title, system_prompt, created_at, updated_at
             FROM sessions ORDER BY updated_at DESC",
        )?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Apply a sparse update and return the materialized row.
    pub fn update(conn: &Connection, id: &str, req: &UpdateSession) -> Result<SessionRow> {
        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(title) = &req.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(StoreError::Validation("session title is empty".into()));
            }
            assignments.push("title = ?");
            values.push(Box::new(title.to_string()));
        }
        if let Some(system_prompt) = &req.system_prompt {
            assignments.push("system_prompt = ?");
            values.push(Box::new(system_prompt.clone()));
        }

        if assignments.is_empty() {
            return Self::get_required(conn, id);
        }

        assignments.push("updated_at = ?");
        values.push(Box::new(now_rfc3339()));
        values.push(Box::new(id.to_string()));

        let sql = format!("UPDATE sessions SET {} WHERE id = ?", assignments.join(", "));
        let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(Box::as_ref).collect();
        let changed = conn.execute(&sql, refs.as_slice())?;
        if changed == 0 {
            return Err(StoreError::SessionNotFound(id.to_string()));
        }
        Self::get_required(conn, id)
    }

    /// Bump the session's `updated_at` (called when a message lands in one
    /// of its columns, so the session list sorts by real activity).
    pub fn touch(conn: &Connection, id: &str) -> Result<()> {
        let _ = conn.execute(
            "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
            params![now_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Delete a session. Columns and messages cascade at the schema level.
    pub fn delete(conn: &Connection, id: &str) -> Result<()> {
        let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
        Ok(SessionRow {
            id: row.get(0)?,
            title: row.get(1)?,
            system_prompt: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
