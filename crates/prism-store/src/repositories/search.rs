//! Full-text search over messages and history.
//!
//! Both FTS5 tables are trigger-maintained, so rows are searchable as soon
//! as the writing transaction commits. Message search is relevance-ranked
//! (bm25); history search is keyed by `(created_at, id)` so cursor
//! pagination stays stable under concurrent inserts.

use rusqlite::{Connection, params};

use crate::cursor::{Cursor, Page};
use crate::errors::Result;
use crate::row_types::HistoryRow;
use crate::types::SearchHit;

/// Search repository — stateless, every method takes `&Connection`.
pub struct SearchRepo;

impl SearchRepo {
    /// Search message bodies, best matches first.
    ///
    /// `session_id` narrows the search to one session's columns.
    pub fn messages(
        conn: &Connection,
        query: &str,
        session_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<SearchHit>> {
        let query = Self::fts_query(query);
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.clamp(1, 200) as i64;

        let mut sql = String::from(
            "SELECT f.id, snippet(messages_fts, 2, '[', ']', '…', 12), bm25(messages_fts), m.created_at
             FROM messages_fts f
             JOIN messages m ON m.id = f.id",
        );
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(query)];
        if let Some(session_id) = session_id {
            sql.push_str(
                " JOIN session_columns c ON c.id = m.column_id
                  WHERE messages_fts MATCH ?1 AND c.session_id = ?2",
            );
            values.push(Box::new(session_id.to_string()));
        } else {
            sql.push_str(" WHERE messages_fts MATCH ?1");
        }
        sql.push_str(" ORDER BY bm25(messages_fts) LIMIT ?");
        sql.push_str(&(values.len() + 1).to_string());
        values.push(Box::new(limit));

        let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(Box::as_ref).collect();
        let mut stmt = conn.prepare(&sql)?;
        let hits = stmt
            .query_map(refs.as_slice(), |row| {
                Ok(SearchHit {
                    entity_id: row.get(0)?,
                    snippet: row.get(1)?,
                    score: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Search history prompts and responses in ascending `(created_at, id)`
    /// order with cursor pagination. Each matching entry is returned exactly
    /// once across pages even as new entries land behind the cursor.
    pub fn history(
        conn: &Connection,
        query: &str,
        limit: u32,
        cursor: Option<&Cursor>,
    ) -> Result<Page<HistoryRow>> {
        let query = Self::fts_query(query);
        if query.is_empty() {
            return Ok(Page {
                items: Vec::new(),
                next_cursor: None,
            });
        }
        let limit = limit.clamp(1, 200) as i64;

        let raw: Vec<(String, String, String, String, Option<i64>, String)> = match cursor {
            None => {
                let mut stmt = conn.prepare(
                    "SELECT h.id, h.prompt, h.provider_ids, h.responses, h.latency_ms, h.created_at
                     FROM history_fts f
                     JOIN history h ON h.id = f.id
                     WHERE history_fts MATCH ?1
                     ORDER BY h.created_at, h.id LIMIT ?2",
                )?;
                stmt.query_map(params![query, limit + 1], Self::map_history)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            Some(cur) => {
                let (after_created, after_id) = cur.decode()?;
                let mut stmt = conn.prepare(
                    "SELECT h.id, h.prompt, h.provider_ids, h.responses, h.latency_ms, h.created_at
                     FROM history_fts f
                     JOIN history h ON h.id = f.id
                     WHERE history_fts MATCH ?1
                       AND (h.created_at > ?2 OR (h.created_at = ?2 AND h.id > ?3))
                     ORDER BY h.created_at, h.id LIMIT ?4",
                )?;
                stmt.query_map(
                    params![query, after_created, after_id, limit + 1],
                    Self::map_history,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        let rows = raw
            .into_iter()
            .map(
                |(id, prompt, provider_ids, responses, latency_ms, created_at)| {
                    Ok(HistoryRow {
                        id,
                        prompt,
                        provider_ids: serde_json::from_str(&provider_ids)?,
                        responses: serde_json::from_str(&responses)?,
                        latency_ms,
                        created_at,
                    })
                },
            )
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::from_overfetch(rows, limit as usize, |row| {
            (row.created_at.clone(), row.id.clone())
        }))
    }

    // Quote each term so user input can never be parsed as FTS5 syntax
    // (NEAR, ^, *, column filters). Terms are AND-ed, FTS5's default.
    fn fts_query(raw: &str) -> String {
        raw.split_whitespace()
            .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn map_history(
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
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
