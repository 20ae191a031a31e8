//! Dispatch lifecycle events.
//!
//! Each provider task emits chunk events as vendor text arrives and exactly
//! one terminal event once its assistant message has been persisted. Events
//! from sibling tasks interleave freely on the shared channel; consumers
//! demultiplex by `column_id`.

use prism_store::row_types::MessageRow;

/// Lifecycle state of one provider's dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    /// Created, request not yet sent.
    Pending,
    /// Response stream open, chunks arriving.
    Streaming,
    /// Stream finished; complete message persisted.
    Completed,
    /// Stream failed; error-marked message persisted.
    Failed,
    /// Cancelled; partial message persisted.
    Cancelled,
}

impl DispatchState {
    /// Whether the dispatch has reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One event on a dispatch's event channel.
#[derive(Clone, Debug)]
pub struct DispatchEvent {
    /// Column the event belongs to.
    pub column_id: String,
    /// Provider serving that column.
    pub provider_id: String,
    /// What happened.
    pub kind: DispatchEventKind,
}

/// Event payload.
#[derive(Clone, Debug)]
pub enum DispatchEventKind {
    /// A text chunk arrived.
    Chunk {
        /// The text fragment.
        text: String,
    },
    /// Stream finished; the persisted complete message.
    Completed {
        /// The persisted assistant message.
        message: MessageRow,
    },
    /// Stream failed; the persisted error-marked message.
    Failed {
        /// Error category (`auth`, `network`, `rate_limit`, ...).
        category: &'static str,
        /// What went wrong, in display form.
        error: String,
        /// The persisted assistant message carrying the error marker.
        /// `None` only if the persistence write itself failed.
        message: Option<MessageRow>,
    },
    /// Dispatch was cancelled; the persisted partial message.
    Cancelled {
        /// The persisted partial message, `None` if persistence failed.
        message: Option<MessageRow>,
    },
}

impl DispatchEventKind {
    /// The terminal state this event signals, if any.
    #[must_use]
    pub fn terminal_state(&self) -> Option<DispatchState> {
        match self {
            Self::Chunk { .. } => None,
            Self::Completed { .. } => Some(DispatchState::Completed),
            Self::Failed { .. } => Some(DispatchState::Failed),
            Self::Cancelled { .. } => Some(DispatchState::Cancelled),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!DispatchState::Pending.is_terminal());
        assert!(!DispatchState::Streaming.is_terminal());
        assert!(DispatchState::Completed.is_terminal());
        assert!(DispatchState::Failed.is_terminal());
        assert!(DispatchState::Cancelled.is_terminal());
    }

    #[test]
    fn chunk_is_not_terminal() {
        let kind = DispatchEventKind::Chunk { text: "x".into() };
        assert!(kind.terminal_state().is_none());
    }
}
