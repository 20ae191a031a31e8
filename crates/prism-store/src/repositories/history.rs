//! Query-history repository.
//!
//! One row per dispatch: the prompt, the targeted provider set, and one
//! response snapshot per provider. Provider IDs and snapshots are stored as
//! JSON text columns; the FTS index over prompt and responses is maintained
//! by schema triggers.

use rusqlite::{Connection, OptionalExtension, params};

use crate::cursor::{Cursor, Page};
use crate::errors::{Result, StoreError};
use crate::row_types::HistoryRow;
use crate::types::{ResponseSnapshot, RetentionPolicy};
use prism_core::ids::HistoryId;
use prism_core::time::now_rfc3339;

/// History repository — stateless, every method takes `&Connection`.
pub struct HistoryRepo;

impl HistoryRepo {
    /// Record one completed dispatch.
    pub fn insert(
        conn: &Connection,
        prompt: &str,
        provider_ids: &[String],
        responses: &[ResponseSnapshot],
        latency_ms: Option<i64>,
    ) -> Result<HistoryRow> {
        let id = HistoryId::new().into_inner();
        let now = now_rfc3339();
        let provider_ids_json = serde_json::to_string(provider_ids)?;
        let responses_json = serde_json::to_string(responses)?;
        let _ = conn.execute(
            "INSERT INTO history (id, prompt, provider_ids, responses, latency_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, prompt, provider_ids_json, responses_json, latency_ms, now],
        )?;
        Ok(HistoryRow {
            id,
            prompt: prompt.to_string(),
            provider_ids: provider_ids.to_vec(),
            responses: responses.to_vec(),
            latency_ms,
            created_at: now,
        })
    }

    /// Get a history entry by ID.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<HistoryRow>> {
        conn.query_row(
            "SELECT id, prompt, provider_ids, responses, latency_ms, created_at
             FROM history WHERE id = ?1",
            params![id],
            Self::map_raw,
        )
        .optional()?
        .map(Self::decode_raw)
        .transpose()
    }

    /// Get a history entry by ID, failing if absent.
    pub fn get_required(conn: &Connection, id: &str) -> Result<HistoryRow> {
        Self::get(conn, id)?.ok_or_else(|| StoreError::HistoryNotFound(id.to_string()))
    }

    /// Page through history in ascending `(created_at, id)` order; the
    /// cursor resumes strictly after the last key of the previous page.
    pub fn page(
        conn: &Connection,
        limit: u32,
        cursor: Option<&Cursor>,
    ) -> Result<Page<HistoryRow>> {
        let limit = limit.clamp(1, 500) as i64;
        let raw = match cursor {
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, prompt, provider_ids, responses, latency_ms, created_at
                     FROM history ORDER BY created_at, id LIMIT ?1",
                )?;
                stmt.query_map(params![limit + 1], Self::map_raw)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            Some(cur) => {
                let (after_created, after_id) = cur.decode()?;
                let mut stmt = conn.prepare(
                    "SELECT id, prompt, provider_ids, responses, latency_ms, created_at
                     FROM history
                     WHERE created_at > ?1 OR (created_at = ?1 AND id > ?2)
                     ORDER BY created_at, id LIMIT ?3",
                )?;
                stmt.query_map(params![after_created, after_id, limit + 1], Self::map_raw)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        let rows = raw
            .into_iter()
            .map(Self::decode_raw)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::from_overfetch(rows, limit as usize, |row| {
            (row.created_at.clone(), row.id.clone())
        }))
    }

    /// Delete entries older than the policy allows. Returns the number of
    /// rows removed; [`RetentionPolicy::Unlimited`] removes nothing.
    pub fn prune(conn: &Connection, policy: RetentionPolicy) -> Result<usize> {
        let days = match policy {
            RetentionPolicy::Unlimited => return Ok(0),
            RetentionPolicy::Days(days) => days,
        };
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(i64::from(days)))
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let removed = conn.execute(
            "DELETE FROM history WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }

    /// Delete a single entry.
    pub fn delete(conn: &Connection, id: &str) -> Result<()> {
        let changed = conn.execute("DELETE FROM history WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::HistoryNotFound(id.to_string()));
        }
        Ok(())
    }

    // Raw row with the JSON columns still as text; decoded outside the
    // rusqlite mapper so serde errors surface as StoreError::Serde.
    fn map_raw(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<(String, String, String, String, Option<i64>, String)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn decode_raw(
        (id, prompt, provider_ids, responses, latency_ms, created_at): (
            String,
            String,
            String,
            String,
            Option<i64>,
            String,
        ),
    ) -> Result<HistoryRow> {
        Ok(HistoryRow {
            id,
            prompt,
            provider_ids: serde_json::from_str(&provider_ids)?,
            responses: serde_json::from_str(&responses)?,
            latency_ms,
            created_at,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
