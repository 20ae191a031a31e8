//! Provider repository.
//!
//! The exclusive-active invariant lives here: a partial unique index keeps
//! at most one row active, and the activate/deactivate statements are only
//! ever composed into single transactions by the store facade.

use rusqlite::{Connection, OptionalExtension, params};
use std::str::FromStr;

use crate::errors::{Result, StoreError};
use crate::row_types::ProviderRow;
use crate::types::{CreateProvider, ProviderKind, UpdateProvider};
use prism_core::ids::ProviderId;
use prism_core::time::now_rfc3339;

/// Provider repository — stateless, every method takes `&Connection`.
pub struct ProviderRepo;

impl ProviderRepo {
    /// Insert a new provider at the end of the display order.
    ///
    /// The first provider ever created is activated automatically. Base URL
    /// and model default from the kind when omitted; a `Custom` provider
    /// with neither an explicit base URL nor model is rejected.
    pub fn create(conn: &Connection, req: &CreateProvider) -> Result<ProviderRow> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("provider name is empty".into()));
        }

        let base_url = req
            .base_url
            .clone()
            .or_else(|| req.kind.default_base_url().map(str::to_string));
        let model = req
            .model
            .clone()
            .or_else(|| req.kind.default_model().map(str::to_string))
            .ok_or_else(|| {
                StoreError::Validation("custom providers require an explicit model".into())
            })?;

        let (count, next_order): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(MAX(display_order), -1) + 1 FROM providers",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        // First provider ever — auto-activate. Decided by count, not by
        // display order, which callers may rearrange freely.
        let is_active = count == 0;

        let id = ProviderId::new().into_inner();
        let now = now_rfc3339();
        let _ = conn.execute(
            "INSERT INTO providers (id, name, kind, base_url, model, secret_ref, is_active,
                                    display_order, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8, ?8)",
            params![
                id,
                name,
                req.kind.as_str(),
                base_url,
                model,
                i64::from(is_active),
                next_order,
                now
            ],
        )?;

        Ok(ProviderRow {
            id,
            name: name.to_string(),
            kind: req.kind,
            base_url,
            model,
            secret_ref: None,
            is_active,
            display_order: next_order,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a provider by ID.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<ProviderRow>> {
        conn.query_row(
            "SELECT id, name, kind, base_url, model, secret_ref, is_active, display_order,
                    created_at, updated_at
             FROM providers WHERE id = ?1",
            params![id],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Get a provider by ID, failing if absent.
    pub fn get_required(conn: &Connection, id: &str) -> Result<ProviderRow> {
        Self::get(conn, id)?.ok_or_else(|| StoreError::ProviderNotFound(id.to_string()))
    }

    /// List all providers ordered by display order.
    pub fn list(conn: &Connection) -> Result<Vec<ProviderRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, kind, base_url, model, secret_ref, is_active, display_order,
                    created_at, updated_at
             FROM providers ORDER BY display_order ASC",
        )?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The currently active provider, if any.
    pub fn active(conn: &Connection) -> Result<Option<ProviderRow>> {
        conn.query_row(
            "SELECT id, name, kind, base_url, model, secret_ref, is_active, display_order,
                    created_at, updated_at
             FROM providers WHERE is_active = 1",
            [],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Apply a sparse update and return the materialized row.
    pub fn update(conn: &Connection, id: &str, req: &UpdateProvider) -> Result<ProviderRow> {
        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(name) = &req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(StoreError::Validation("provider name is empty".into()));
            }
            assignments.push("name = ?");
            values.push(Box::new(name.to_string()));
        }
        if let Some(base_url) = &req.base_url {
            assignments.push("base_url = ?");
            values.push(Box::new(base_url.clone()));
        }
        if let Some(model) = &req.model {
            assignments.push("model = ?");
            values.push(Box::new(model.clone()));
        }
        if let Some(order) = req.display_order {
            assignments.push("display_order = ?");
            values.push(Box::new(order));
        }

        if assignments.is_empty() {
            return Self::get_required(conn, id);
        }

        assignments.push("updated_at = ?");
        values.push(Box::new(now_rfc3339()));
        values.push(Box::new(id.to_string()));

        let sql = format!(
            "UPDATE providers SET {} WHERE id = ?",
            assignments.join(", ")
        );
        let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(Box::as_ref).collect();
        let changed = conn.execute(&sql, refs.as_slice())?;
        if changed == 0 {
            return Err(StoreError::ProviderNotFound(id.to_string()));
        }
        Self::get_required(conn, id)
    }

    /// Clear the active flag on every provider.
    ///
    /// Only meaningful inside a transaction that immediately re-activates
    /// another provider; on its own it would break the exactly-one-active
    /// invariant for a non-empty set.
    pub fn clear_active(conn: &Connection) -> Result<()> {
        let _ = conn.execute("UPDATE providers SET is_active = 0 WHERE is_active = 1", [])?;
        Ok(())
    }

    /// Set the active flag on one provider. Callers must have cleared the
    /// previous flag in the same transaction.
    pub fn mark_active(conn: &Connection, id: &str) -> Result<()> {
        let changed = conn.execute(
            "UPDATE providers SET is_active = 1, updated_at = ?1 WHERE id = ?2",
            params![now_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::ProviderNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Activate the surviving provider with the lowest display order, if any.
    pub fn activate_first_by_order(conn: &Connection) -> Result<Option<String>> {
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM providers ORDER BY display_order ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = &id {
            Self::mark_active(conn, id)?;
        }
        Ok(id)
    }

    /// Delete a provider row. Returns whether it was the active one.
    pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
        let was_active: bool = conn
            .query_row(
                "SELECT is_active FROM providers WHERE id = ?1",
                params![id],
                |row| row.get::<_, i64>(0).map(|v| v == 1),
            )
            .optional()?
            .ok_or_else(|| StoreError::ProviderNotFound(id.to_string()))?;
        let _ = conn.execute("DELETE FROM providers WHERE id = ?1", params![id])?;
        Ok(was_active)
    }

    /// Set or clear the secret-store reference.
    pub fn set_secret_ref(conn: &Connection, id: &str, secret_ref: Option<&str>) -> Result<()> {
        let changed = conn.execute(
            "UPDATE providers SET secret_ref = ?1, updated_at = ?2 WHERE id = ?3",
            params![secret_ref, now_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::ProviderNotFound(id.to_string()));
        }
        Ok(())
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProviderRow> {
        let kind_str: String = row.get(2)?;
        let kind = ProviderKind::from_str(&kind_str).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown provider kind: {kind_str}").into(),
            )
        })?;
        Ok(ProviderRow {
            id: row.get(0)?,
            name: row.get(1)?,
            kind,
            base_url: row.get(3)?,
            model: row.get(4)?,
            secret_ref: row.get(5)?,
            is_active: row.get::<_, i64>(6)? == 1,
            display_order: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
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

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    fn req(name: &str, kind: ProviderKind) -> CreateProvider {
        CreateProvider {
            name: name.into(),
            kind,
            base_url: None,
            model: None,
        }
    }

    #[test]
    fn first_provider_is_auto_activated() {
        let conn = conn();
        let p1 = ProviderRepo::create(&conn, &req("First", ProviderKind::OpenAi)).unwrap();
        assert!(p1.is_active);
        assert_eq!(p1.display_order, 0);

        let p2 = ProviderRepo::create(&conn, &req("Second", ProviderKind::Anthropic)).unwrap();
        assert!(!p2.is_active);
        assert_eq!(p2.display_order, 1);
    }

    #[test]
    fn activation_survives_display_order_rearrangement() {
        let conn = conn();
        let p1 = ProviderRepo::create(&conn, &req("First", ProviderKind::OpenAi)).unwrap();
        let _ = ProviderRepo::update(
            &conn,
            &p1.id,
            &UpdateProvider {
                display_order: Some(-1),
                ..Default::default()
            },
        )
        .unwrap();

        // The table is non-empty, so the newcomer must not steal activation
        // even though MAX(display_order) + 1 lands it at order zero.
        let p2 = ProviderRepo::create(&conn, &req("Second", ProviderKind::Anthropic)).unwrap();
        assert_eq!(p2.display_order, 0);
        assert!(!p2.is_active);
        assert_eq!(ProviderRepo::active(&conn).unwrap().unwrap().id, p1.id);
    }

    #[test]
    fn defaults_come_from_the_kind() {
        let conn = conn();
        let p = ProviderRepo::create(&conn, &req("G", ProviderKind::Google)).unwrap();
        assert_eq!(
            p.base_url.as_deref(),
            Some("https://generativelanguage.googleapis.com/v1beta")
        );
        assert_eq!(p.model, "gemini-1.5-pro");
    }

    #[test]
    fn custom_without_model_is_rejected() {
        let conn = conn();
        let err = ProviderRepo::create(&conn, &req("C", ProviderKind::Custom)).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn blank_name_is_rejected() {
        let conn = conn();
        let err = ProviderRepo::create(&conn, &req("   ", ProviderKind::OpenAi)).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn sparse_update_leaves_other_fields() {
        let conn = conn();
        let p = ProviderRepo::create(&conn, &req("Name", ProviderKind::OpenAi)).unwrap();
        let updated = ProviderRepo::update(
            &conn,
            &p.id,
            &UpdateProvider {
                model: Some("gpt-4o".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.model, "gpt-4o");
        assert_eq!(updated.name, "Name");
        assert_eq!(updated.base_url, p.base_url);
    }

    #[test]
    fn empty_update_returns_current_row() {
        let conn = conn();
        let p = ProviderRepo::create(&conn, &req("Name", ProviderKind::OpenAi)).unwrap();
        let same = ProviderRepo::update(&conn, &p.id, &UpdateProvider::default()).unwrap();
        assert_eq!(same.updated_at, p.updated_at);
    }

    #[test]
    fn update_unknown_provider_fails() {
        let conn = conn();
        let err = ProviderRepo::update(
            &conn,
            "prov_missing",
            &UpdateProvider {
                name: Some("X".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::ProviderNotFound(_)));
    }

    #[test]
    fn delete_reports_active_flag() {
        let conn = conn();
        let p1 = ProviderRepo::create(&conn, &req("A", ProviderKind::OpenAi)).unwrap();
        let p2 = ProviderRepo::create(&conn, &req("B", ProviderKind::OpenAi)).unwrap();
        assert!(ProviderRepo::delete(&conn, &p1.id).unwrap());
        assert!(!ProviderRepo::delete(&conn, &p2.id).unwrap());
    }

    #[test]
    fn secret_ref_roundtrip() {
        let conn = conn();
        let p = ProviderRepo::create(&conn, &req("A", ProviderKind::OpenAi)).unwrap();
        ProviderRepo::set_secret_ref(&conn, &p.id, Some("prism/prov_a")).unwrap();
        let row = ProviderRepo::get_required(&conn, &p.id).unwrap();
        assert_eq!(row.secret_ref.as_deref(), Some("prism/prov_a"));
        ProviderRepo::set_secret_ref(&conn, &p.id, None).unwrap();
        assert!(ProviderRepo::get_required(&conn, &p.id).unwrap().secret_ref.is_none());
    }
}
