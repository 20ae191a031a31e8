//! Session and history export.
//!
//! Two formats: Markdown for humans, JSON for machines. The JSON shape is
//! the serde serialization of the row types, so exports stay in lockstep
//! with the stored schema.

use std::fmt::Write as _;

use serde::Serialize;

use crate::errors::{Result, StoreError};
use crate::row_types::{ColumnRow, HistoryRow, MessageRow, SessionRow};
use crate::store::ChatStore;
use prism_core::role::Role;

/// Export output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// Human-readable Markdown.
    Markdown,
    /// Pretty-printed JSON mirroring the stored rows.
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionExport<'a> {
    session: &'a SessionRow,
    columns: Vec<ColumnExport<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ColumnExport<'a> {
    column: &'a ColumnRow,
    messages: &'a [MessageRow],
}

/// Export one session with all of its columns and messages.
pub fn export_session(store: &ChatStore, session_id: &str, format: ExportFormat) -> Result<String> {
    let sc = store.get_session(session_id)?;
    let mut per_column = Vec::with_capacity(sc.columns.len());
    for column in &sc.columns {
        per_column.push(store.column_messages(&column.id)?);
    }

    match format {
        ExportFormat::Json => {
            let doc = SessionExport {
                session: &sc.session,
                columns: sc
                    .columns
                    .iter()
                    .zip(per_column.iter())
                    .map(|(column, messages)| ColumnExport {
                        column,
                        messages: messages.as_slice(),
                    })
                    .collect(),
            };
            serde_json::to_string_pretty(&doc).map_err(StoreError::Serde)
        }
        ExportFormat::Markdown => {
            let mut out = String::new();
            let _ = writeln!(out, "# {}\n", sc.session.title);
            if let Some(prompt) = &sc.session.system_prompt {
                let _ = writeln!(out, "_System prompt:_ {prompt}\n");
            }
            for (column, messages) in sc.columns.iter().zip(per_column.iter()) {
                let heading = column.provider_id.as_deref().unwrap_or("(provider removed)");
                let _ = writeln!(out, "## {heading}\n");
                for message in messages {
                    write_message(&mut out, message);
                }
            }
            Ok(out)
        }
    }
}

/// Export a slice of history entries in the order given.
pub fn export_history(entries: &[HistoryRow], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(entries).map_err(StoreError::Serde),
        ExportFormat::Markdown => {
            let mut out = String::new();
            let _ = writeln!(out, "# Query history\n");
            for entry in entries {
                let _ = writeln!(out, "## {}\n\n_{}_\n", entry.prompt, entry.created_at);
                for response in &entry.responses {
                    match &response.error {
                        Some(error) => {
                            let _ = writeln!(
                                out,
                                "**{}** _(failed: {error})_\n",
                                response.provider_id
                            );
                        }
                        None => {
                            let _ = writeln!(
                                out,
                                "**{}**\n\n{}\n",
                                response.provider_id, response.text
                            );
                        }
                    }
                }
            }
            Ok(out)
        }
    }
}

fn write_message(out: &mut String, message: &MessageRow) {
    let label = match message.role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::System => "System",
    };
    match &message.error {
        Some(error) => {
            let _ = writeln!(out, "**{label}** _({}: {error})_\n", message.status.as_str());
        }
        None => {
            let _ = writeln!(out, "**{label}**\n\n{}\n", message.body);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
