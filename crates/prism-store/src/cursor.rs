//! Opaque pagination cursors over `(created_at, id)`.
//!
//! Timestamps alone are not unique, so ordered queries use the pair
//! `(created_at, id)` as a total order (IDs are time-ordered UUID v7, so the
//! pair order matches insertion order). A cursor encodes the last-seen pair;
//! the next page returns rows strictly after it. Because both tables are
//! append-only and new rows always sort after existing ones, repeated paging
//! yields every row exactly once even while rows are being appended.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StoreError};

/// An opaque position token for forward pagination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Encode a `(created_at, id)` pair as an opaque token.
    #[must_use]
    pub fn encode(created_at: &str, id: &str) -> Self {
        Self(URL_SAFE_NO_PAD.encode(format!("{created_at}\n{id}")))
    }

    /// Decode the token back into its `(created_at, id)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] on malformed tokens — cursors come
    /// from callers and are never trusted.
    pub fn decode(&self) -> Result<(String, String)> {
        let bytes = URL_SAFE_NO_PAD
            .decode(&self.0)
            .map_err(|_| StoreError::Validation("malformed cursor".into()))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| StoreError::Validation("malformed cursor".into()))?;
        let (created_at, id) = text
            .split_once('\n')
            .ok_or_else(|| StoreError::Validation("malformed cursor".into()))?;
        Ok((created_at.to_string(), id.to_string()))
    }

    /// The raw token string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Cursor {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One page of an ordered query.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Rows in `(created_at, id)` order.
    pub items: Vec<T>,
    /// Cursor for the next page, or `None` when exhausted.
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    /// Build a page from `limit + 1` fetched rows: the extra row, if present,
    /// only signals that another page exists.
    pub fn from_overfetch(
        mut items: Vec<T>,
        limit: usize,
        key: impl Fn(&T) -> (String, String),
    ) -> Self {
        let has_more = items.len() > limit;
        if has_more {
            items.truncate(limit);
        }
        let next_cursor = if has_more {
            items.last().map(|last| {
                let (created_at, id) = key(last);
                Cursor::encode(&created_at, &id)
            })
        } else {
            None
        };
        Self { items, next_cursor }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
