//! Session-column repository.
//!
//! A column is one provider's conversation thread within a session. Columns
//! are ordered by `position`, and carry a weak provider reference: deleting
//! the provider leaves the column (and its messages) intact with
//! `provider_id = NULL`.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::{Result, StoreError};
use crate::row_types::ColumnRow;
use prism_core::ids::ColumnId;
use prism_core::time::now_rfc3339;

/// Column repository — stateless, every method takes `&Connection`.
pub struct ColumnRepo;

impl ColumnRepo {
    /// Append a column for `provider_id` at the end of the session's list.
    pub fn create(conn: &Connection, session_id: &str, provider_id: &str) -> Result<ColumnRow> {
        let position: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM session_columns WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        let id = ColumnId::new().into_inner();
        let now = now_rfc3339();
        let _ = conn.execute(
            "INSERT INTO session_columns (id, session_id, provider_id, position, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, session_id, provider_id, position, now],
        )?;
        Ok(ColumnRow {
            id,
            session_id: session_id.to_string(),
            provider_id: Some(provider_id.to_string()),
            position,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a column by ID.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<ColumnRow>> {
        conn.query_row(
            "SELECT id, session_id, provider_id, position, created_at, updated_at
             FROM session_columns WHERE id = ?1",
            params![id],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Get a column by ID, failing if absent.
    pub fn get_required(conn: &Connection, id: &str) -> Result<ColumnRow> {
        Self::get(conn, id)?.ok_or_else(|| StoreError::ColumnNotFound(id.to_string()))
    }

    /// List a session's columns in position order.
    pub fn list_by_session(conn: &Connection, session_id: &str) -> Result<Vec<ColumnRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, session_id, provider_id, position, created_at, updated_at
             FROM session_columns WHERE session_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![session_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Find the column in `session_id` bound to `provider_id`, if any.
    pub fn find_by_provider(
        conn: &Connection,
        session_id: &str,
        provider_id: &str,
    ) -> Result<Option<ColumnRow>> {
        conn.query_row(
            "SELECT id, session_id, provider_id, position, created_at, updated_at
             FROM session_columns WHERE session_id = ?1 AND provider_id = ?2",
            params![session_id, provider_id],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Reconcile a session's columns against the desired provider list.
    ///
    /// Columns whose provider is in `provider_ids` are kept (messages and
    /// all); missing providers get a fresh column; columns for providers no
    /// longer in the list are deleted along with their messages. Surviving
    /// and new columns are repositioned to match the order of `provider_ids`.
    pub fn reconcile(
        conn: &Connection,
        session_id: &str,
        provider_ids: &[String],
    ) -> Result<Vec<ColumnRow>> {
        let existing = Self::list_by_session(conn, session_id)?;

        for col in &existing {
            let keep = col
                .provider_id
                .as_deref()
                .is_some_and(|pid| provider_ids.iter().any(|want| want == pid));
            if !keep {
                let _ = conn.execute(
                    "DELETE FROM session_columns WHERE id = ?1",
                    params![col.id],
                )?;
            }
        }

        let now = now_rfc3339();
        for (position, provider_id) in provider_ids.iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| StoreError::Validation("too many columns".into()))?;
            let existing_id = existing
                .iter()
                .find(|c| c.provider_id.as_deref() == Some(provider_id))
                .map(|c| c.id.clone());
            match existing_id {
                Some(id) => {
                    let _ = conn.execute(
                        "UPDATE session_columns SET position = ?1, updated_at = ?2 WHERE id = ?3",
                        params![position, now, id],
                    )?;
                }
                None => {
                    let id = ColumnId::new().into_inner();
                    let _ = conn.execute(
                        "INSERT INTO session_columns (id, session_id, provider_id, position, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                        params![id, session_id, provider_id, position, now],
                    )?;
                }
            }
        }

        Self::list_by_session(conn, session_id)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ColumnRow> {
        Ok(ColumnRow {
            id: row.get(0)?,
            session_id: row.get(1)?,
            provider_id: row.get(2)?,
            position: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use crate::repositories::{ProviderRepo, SessionRepo};
    use crate::types::{CreateProvider, ProviderKind};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    fn provider(conn: &Connection, name: &str) -> String {
        ProviderRepo::create(
            conn,
            &CreateProvider {
                name: name.into(),
                kind: ProviderKind::OpenAi,
                base_url: None,
                model: None,
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn columns_are_positioned_in_creation_order() {
        let conn = conn();
        let s = SessionRepo::create(&conn, "T", None).unwrap();
        let a = provider(&conn, "A");
        let b = provider(&conn, "B");
        let ca = ColumnRepo::create(&conn, &s.id, &a).unwrap();
        let cb = ColumnRepo::create(&conn, &s.id, &b).unwrap();
        assert_eq!((ca.position, cb.position), (0, 1));

        let listed = ColumnRepo::list_by_session(&conn, &s.id).unwrap();
        assert_eq!(
            listed.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec![ca.id.as_str(), cb.id.as_str()]
        );
    }

    #[test]
    fn reconcile_keeps_reorders_and_drops() {
        let conn = conn();
        let s = SessionRepo::create(&conn, "T", None).unwrap();
        let a = provider(&conn, "A");
        let b = provider(&conn, "B");
        let c = provider(&conn, "C");
        let col_a = ColumnRepo::create(&conn, &s.id, &a).unwrap();
        let _col_b = ColumnRepo::create(&conn, &s.id, &b).unwrap();

        // Want: C first, then A. B's column goes away.
        let cols = ColumnRepo::reconcile(&conn, &s.id, &[c.clone(), a.clone()]).unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].provider_id.as_deref(), Some(c.as_str()));
        assert_eq!(cols[1].provider_id.as_deref(), Some(a.as_str()));
        assert_eq!(cols[1].id, col_a.id, "existing column survives reorder");
        assert!(
            !cols.iter().any(|col| col.provider_id.as_deref() == Some(b.as_str())),
            "dropped provider's column is gone"
        );
    }

    #[test]
    fn find_by_provider() {
        let conn = conn();
        let s = SessionRepo::create(&conn, "T", None).unwrap();
        let a = provider(&conn, "A");
        let created = ColumnRepo::create(&conn, &s.id, &a).unwrap();
        let found = ColumnRepo::find_by_provider(&conn, &s.id, &a).unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(
            ColumnRepo::find_by_provider(&conn, &s.id, "prov_nope")
                .unwrap()
                .is_none()
        );
    }
}
