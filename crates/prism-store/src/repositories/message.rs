//! Message repository.
//!
//! Messages are append-only: rows are written once, already in a terminal
//! status, and never updated. A failed assistant turn is recorded as a new
//! row with `status = 'error'` (or `'partial'` for a truncated stream), not
//! as a mutation of an earlier row.

use rusqlite::{Connection, OptionalExtension, params};

use crate::cursor::{Cursor, Page};
use crate::errors::{Result, StoreError};
use crate::row_types::MessageRow;
use crate::types::MessageStatus;
use prism_core::ids::MessageId;
use prism_core::role::Role;
use prism_core::time::now_rfc3339;

/// Message repository — stateless, every method takes `&Connection`.
pub struct MessageRepo;

impl MessageRepo {
    /// Append a message to a column at the next sequence number.
    ///
    /// `error` must be `None` for [`MessageStatus::Complete`] and `Some`
    /// otherwise, so every non-complete row carries a readable marker.
    pub fn append(
        conn: &Connection,
        column_id: &str,
        role: Role,
        body: &str,
        status: MessageStatus,
        error: Option<&str>,
    ) -> Result<MessageRow> {
        match (status, error) {
            (MessageStatus::Complete, Some(_)) => {
                return Err(StoreError::Validation(
                    "complete message cannot carry an error marker".into(),
                ));
            }
            (MessageStatus::Error | MessageStatus::Partial, None) => {
                return Err(StoreError::Validation(
                    "failed message requires an error marker".into(),
                ));
            }
            _ => {}
        }

        let sequence: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence), -1) + 1 FROM messages WHERE column_id = ?1",
            params![column_id],
            |row| row.get(0),
        )?;
        let id = MessageId::new().into_inner();
        let now = now_rfc3339();
        let _ = conn.execute(
            "INSERT INTO messages (id, column_id, role, body, sequence, status, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                column_id,
                role.as_str(),
                body,
                sequence,
                status.as_str(),
                error,
                now
            ],
        )?;
        Ok(MessageRow {
            id,
            column_id: column_id.to_string(),
            role,
            body: body.to_string(),
            sequence,
            status,
            error: error.map(String::from),
            created_at: now,
        })
    }

    /// Get a message by ID.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
        conn.query_row(
            "SELECT id, column_id, role, body, sequence, status, error, created_at
             FROM messages WHERE id = ?1",
            params![id],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// List a column's messages in sequence order.
    pub fn list_by_column(conn: &Connection, column_id: &str) -> Result<Vec<MessageRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, column_id, role, body, sequence, status, error, created_at
             FROM messages WHERE column_id = ?1 ORDER BY sequence",
        )?;
        let rows = stmt
            .query_map(params![column_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Page through a column's messages in ascending `(created_at, id)`
    /// order.
    ///
    /// The cursor encodes the key of the last item on the previous page and
    /// pages resume strictly after it, so each row is returned exactly once
    /// across pages and rows appended mid-pagination still surface on a
    /// later page.
    pub fn page_by_column(
        conn: &Connection,
        column_id: &str,
        limit: u32,
        cursor: Option<&Cursor>,
    ) -> Result<Page<MessageRow>> {
        let limit = limit.clamp(1, 500) as i64;
        let rows = match cursor {
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, column_id, role, body, sequence, status, error, created_at
                     FROM messages WHERE column_id = ?1
                     ORDER BY created_at, id LIMIT ?2",
                )?;
                stmt.query_map(params![column_id, limit + 1], Self::map_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            Some(cur) => {
                let (after_created, after_id) = cur.decode()?;
                let mut stmt = conn.prepare(
                    "SELECT id, column_id, role, body, sequence, status, error, created_at
                     FROM messages
                     WHERE column_id = ?1
                       AND (created_at > ?2 OR (created_at = ?2 AND id > ?3))
                     ORDER BY created_at, id LIMIT ?4",
                )?;
                stmt.query_map(
                    params![column_id, after_created, after_id, limit + 1],
                    Self::map_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(Page::from_overfetch(rows, limit as usize, |row| {
            (row.created_at.clone(), row.id.clone())
        }))
    }

    /// Count messages in a column.
    pub fn count_by_column(conn: &Connection, column_id: &str) -> Result<i64> {
        conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE column_id = ?1",
            params![column_id],
            |row| row.get(0),
        )
        .map_err(Into::into)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
        let role: String = row.get(2)?;
        let status: String = row.get(5)?;
        Ok(MessageRow {
            id: row.get(0)?,
            column_id: row.get(1)?,
            role: role.parse().map_err(|_| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    format!("unknown role: {role}").into(),
                )
            })?,
            body: row.get(3)?,
            sequence: row.get(4)?,
            status: status.parse().map_err(|_| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    format!("unknown status: {status}").into(),
                )
            })?,
            error: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
