//! Read-time turn reconstruction.
//!
//! Turns are never persisted. [`reconstruct_turns`] derives them from the
//! raw, sequence-ordered message list of one column on every read, so a
//! change to the pairing rule is a code change, never a migration.
//!
//! The rule: a turn opens at a user-role message and closes at the next
//! user-role message (or end of sequence); every assistant/system message in
//! between joins its response set. A turn whose response set is empty or
//! whose responses carry an error/partial marker is reported as open or
//! errored rather than dropped — callers must be able to tell "awaiting
//! response", "errored", and "complete" apart.

use serde::{Deserialize, Serialize};

use crate::row_types::MessageRow;
use crate::types::MessageStatus;
use prism_core::role::Role;

/// Completion state of a reconstructed turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// No response has been recorded yet (dispatch pending or in flight).
    AwaitingResponse,
    /// At least one response carries an error or was cut short.
    Errored,
    /// Every response completed normally.
    Complete,
}

/// One derived user/response pairing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// The opening user message.
    pub user: MessageRow,
    /// Assistant/system messages up to the next user message, in sequence
    /// order.
    pub responses: Vec<MessageRow>,
    /// Derived completion state.
    pub state: TurnState,
}

/// Reconstruct turns from a column's messages.
///
/// `messages` must be the column's full message list in ascending sequence
/// order (the repository's natural order). The function is pure: the same
/// input always yields the same turns.
///
/// Non-user messages that precede the first user message (e.g. a persisted
/// system prompt) belong to no turn and are skipped here; callers that need
/// them read the raw message list.
#[must_use]
pub fn reconstruct_turns(messages: &[MessageRow]) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();

    for message in messages {
        if message.role == Role::User {
            turns.push(Turn {
                user: message.clone(),
                responses: Vec::new(),
                state: TurnState::AwaitingResponse,
            });
        } else if let Some(open) = turns.last_mut() {
            open.responses.push(message.clone());
        }
    }

    for turn in &mut turns {
        turn.state = derive_state(&turn.responses);
    }

    turns
}

fn derive_state(responses: &[MessageRow]) -> TurnState {
    if responses.is_empty() {
        return TurnState::AwaitingResponse;
    }
    let any_failed = responses
        .iter()
        .any(|m| matches!(m.status, MessageStatus::Error | MessageStatus::Partial));
    if any_failed {
        TurnState::Errored
    } else {
        TurnState::Complete
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn message(seq: i64, role: Role, body: &str, status: MessageStatus) -> MessageRow {
        MessageRow {
            id: format!("msg_{seq}"),
            column_id: "col_1".into(),
            role,
            body: body.into(),
            sequence: seq,
            status,
            error: None,
            created_at: format!("2025-01-01T00:00:0{seq}Z"),
        }
    }

    #[test]
    fn pairs_user_with_following_assistant() {
        let messages = vec![
            message(0, Role::User, "hi", MessageStatus::Complete),
            message(1, Role::Assistant, "hello", MessageStatus::Complete),
        ];
        let turns = reconstruct_turns(&messages);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].user.body, "hi");
        assert_eq!(turns[0].responses.len(), 1);
        assert_eq!(turns[0].state, TurnState::Complete);
    }

    #[test]
    fn trailing_user_message_yields_open_turn() {
        // Scenario from the design notes: [user:"hi", assistant:"hello",
        // user:"bye"] must give two turns, the second open.
        let messages = vec![
            message(0, Role::User, "hi", MessageStatus::Complete),
            message(1, Role::Assistant, "hello", MessageStatus::Complete),
            message(2, Role::User, "bye", MessageStatus::Complete),
        ];
        let turns = reconstruct_turns(&messages);
        assert_eq!(turns.len(), 2);
        assert!(turns[1].responses.is_empty());
        assert_eq!(turns[1].state, TurnState::AwaitingResponse);
    }

    #[test]
    fn errored_response_marks_turn_errored() {
        let mut failed = message(1, Role::Assistant, "partial text", MessageStatus::Error);
        failed.error = Some("auth error".into());
        let messages = vec![
            message(0, Role::User, "hi", MessageStatus::Complete),
            failed,
        ];
        let turns = reconstruct_turns(&messages);
        assert_eq!(turns[0].state, TurnState::Errored);
    }

    #[test]
    fn cancelled_partial_marks_turn_errored() {
        let messages = vec![
            message(0, Role::User, "hi", MessageStatus::Complete),
            message(1, Role::Assistant, "half an ans", MessageStatus::Partial),
        ];
        let turns = reconstruct_turns(&messages);
        assert_eq!(turns[0].state, TurnState::Errored);
    }

    #[test]
    fn system_messages_join_the_enclosing_turn() {
        let messages = vec![
            message(0, Role::User, "hi", MessageStatus::Complete),
            message(1, Role::System, "note", MessageStatus::Complete),
            message(2, Role::Assistant, "hello", MessageStatus::Complete),
        ];
        let turns = reconstruct_turns(&messages);
        assert_eq!(turns[0].responses.len(), 2);
        assert_eq!(turns[0].state, TurnState::Complete);
    }

    #[test]
    fn leading_non_user_messages_belong_to_no_turn() {
        let messages = vec![
            message(0, Role::System, "be terse", MessageStatus::Complete),
            message(1, Role::User, "hi", MessageStatus::Complete),
        ];
        let turns = reconstruct_turns(&messages);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].user.body, "hi");
    }

    #[test]
    fn reconstruction_is_pure() {
        let messages = vec![
            message(0, Role::User, "hi", MessageStatus::Complete),
            message(1, Role::Assistant, "hello", MessageStatus::Complete),
            message(2, Role::User, "bye", MessageStatus::Complete),
        ];
        let first = reconstruct_turns(&messages);
        let second = reconstruct_turns(&messages);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.user.id, b.user.id);
            assert_eq!(a.state, b.state);
            assert_eq!(a.responses.len(), b.responses.len());
        }
    }

    #[test]
    fn empty_column_yields_no_turns() {
        assert!(reconstruct_turns(&[]).is_empty());
    }
}
