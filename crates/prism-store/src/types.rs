//! Public API types: provider kinds, message status, request/view shapes.
//!
//! Row types (raw table shapes) live in [`crate::row_types`]; these are the
//! types the service layer and UI-facing code exchange with the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::StoreError;
use crate::row_types::ProviderRow;

pub use prism_core::kind::ProviderKind;

/// Terminal status of a persisted message.
///
/// Messages are written once, at the terminal state of the stream that
/// produced them, so the status never changes after insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Stream finished normally.
    Complete,
    /// Stream failed; `error` carries the marker, `body` the partial text.
    Error,
    /// Stream was cancelled; `body` holds whatever had accumulated.
    Partial,
}

impl MessageStatus {
    /// Stable string form used in the database `status` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Partial => "partial",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            "partial" => Ok(Self::Partial),
            other => Err(StoreError::Validation(format!(
                "unknown message status: {other}"
            ))),
        }
    }
}

/// Request to create a provider.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProvider {
    /// Display name.
    pub name: String,
    /// Provider family.
    pub kind: ProviderKind,
    /// Base URL; defaults from the kind when omitted.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model identifier; defaults from the kind when omitted.
    #[serde(default)]
    pub model: Option<String>,
}

/// Sparse provider update. `None` fields are left untouched.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProvider {
    /// New display name.
    pub name: Option<String>,
    /// New base URL.
    pub base_url: Option<String>,
    /// New model identifier.
    pub model: Option<String>,
    /// New display order.
    pub display_order: Option<i64>,
}

/// Provider as exposed to the UI: secret-store reference replaced by a
/// presence flag. The raw key never appears here.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    /// Provider ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Provider family.
    pub kind: ProviderKind,
    /// Base URL (resolved default or explicit).
    pub base_url: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Whether this is the active provider.
    pub is_active: bool,
    /// Position in the provider list.
    pub display_order: i64,
    /// Whether an API key is stored for this provider.
    pub has_api_key: bool,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

impl ProviderView {
    /// Build a view from a raw row, collapsing the secret reference into a
    /// presence flag.
    #[must_use]
    pub fn from_row(row: ProviderRow) -> Self {
        Self {
            has_api_key: row.secret_ref.is_some(),
            id: row.id,
            name: row.name,
            kind: row.kind,
            base_url: row.base_url,
            model: row.model,
            is_active: row.is_active,
            display_order: row.display_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Request to create a session together with its provider columns.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSession {
    /// Session title; blank titles normalize to "New session".
    pub title: String,
    /// Optional system prompt applied to every column.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Ordered provider IDs; one column is created per entry.
    #[serde(default)]
    pub provider_ids: Vec<String>,
}

/// Sparse session update. `None` fields are left untouched.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSession {
    /// New title.
    pub title: Option<String>,
    /// New system prompt (`Some(None)` clears it).
    pub system_prompt: Option<Option<String>>,
}

/// Retention policy for history entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetentionPolicy {
    /// Keep entries for this many days.
    Days(u32),
    /// Never prune.
    Unlimited,
}

/// One provider's response snapshot inside a history entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    /// Responding provider.
    pub provider_id: String,
    /// Final (possibly partial) response text.
    pub text: String,
    /// Error marker if the provider's stream failed.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// A full-text search hit.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Matched entity ID (message or history entry).
    pub entity_id: String,
    /// Highlighted snippet around the match.
    pub snippet: String,
    /// BM25 relevance score (lower is better, per FTS5).
    pub score: f64,
    /// Entity creation timestamp.
    pub created_at: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_status_roundtrip() {
        for status in [
            MessageStatus::Complete,
            MessageStatus::Error,
            MessageStatus::Partial,
        ] {
            assert_eq!(status.as_str().parse::<MessageStatus>().unwrap(), status);
        }
    }

    #[test]
    fn response_snapshot_omits_absent_error() {
        let snap = ResponseSnapshot {
            provider_id: "prov_a".into(),
            text: "ok".into(),
            error: None,
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("error").is_none());
    }
}
