//! Database row types mapping `SQLite` rows to Rust structs.
//!
//! These mirror the table shapes exactly. Conversion to UI-facing types
//! (e.g. [`crate::types::ProviderView`]) happens above the repository layer
//! so raw secret references never leak past the store boundary by accident.

use serde::{Deserialize, Serialize};

use crate::types::{MessageStatus, ProviderKind};
use prism_core::role::Role;

/// Raw row from the `providers` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRow {
    /// Provider ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Provider family.
    pub kind: ProviderKind,
    /// Base URL, if explicitly configured.
    pub base_url: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Secret-store reference for the API key. Never the key itself.
    #[serde(skip_serializing)]
    pub secret_ref: Option<String>,
    /// Whether this is the active provider.
    pub is_active: bool,
    /// Position in the provider list.
    pub display_order: i64,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

/// Raw row from the `sessions` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    /// Session ID.
    pub id: String,
    /// Session title.
    pub title: String,
    /// Optional system prompt.
    pub system_prompt: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

/// Raw row from the `session_columns` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRow {
    /// Column ID.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Referenced provider. `None` once the provider is deleted — the
    /// column is then inert but its messages remain readable.
    pub provider_id: Option<String>,
    /// Ordinal position within the session.
    pub position: i64,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

/// Raw row from the `messages` table. Append-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRow {
    /// Message ID.
    pub id: String,
    /// Owning column.
    pub column_id: String,
    /// Author role.
    pub role: Role,
    /// Message body text.
    pub body: String,
    /// Monotonic per-column sequence number.
    pub sequence: i64,
    /// Terminal status.
    pub status: MessageStatus,
    /// Error marker for failed assistant turns.
    pub error: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
}

/// Raw row from the `history` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRow {
    /// History entry ID.
    pub id: String,
    /// Submitted prompt.
    pub prompt: String,
    /// Targeted provider IDs (JSON array in storage).
    pub provider_ids: Vec<String>,
    /// Per-provider response snapshots (JSON array in storage).
    pub responses: Vec<crate::types::ResponseSnapshot>,
    /// Wall-clock latency of the whole dispatch, if measured.
    pub latency_ms: Option<i64>,
    /// Creation timestamp.
    pub created_at: String,
}
