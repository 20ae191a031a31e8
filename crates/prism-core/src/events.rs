//! Normalized streaming protocol.
//!
//! Every provider adapter, regardless of the vendor's wire format, emits a
//! sequence of [`StreamEvent`]s ending in exactly one terminal event
//! ([`StreamEvent::Done`]). Transport or protocol failures surface as an
//! `Err` item on the stream itself, so consumers see a single unified
//! "chunks then terminal" shape for every vendor.

use serde::{Deserialize, Serialize};

/// One event in a normalized provider response stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental text content.
    Delta {
        /// Text fragment.
        text: String,
    },

    /// Stream completed successfully.
    Done,
}

impl StreamEvent {
    /// Text payload for delta events, empty otherwise.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Delta { text } => text,
            Self::Done => "",
        }
    }

    /// Whether this event terminates the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
