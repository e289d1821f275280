//! Append-only conversation history.
//!
//! [`ConversationState`] is owned by the session and lent to each round.  The
//! planner never writes to it directly: it works on a [`snapshot`] and the
//! session appends the user and assistant turns only once a round has been
//! dispatched.  A round that fails before that point leaves the history
//! exactly as it was.
//!
//! [`snapshot`]: ConversationState::snapshot

use std::sync::Arc;

use embodia_types::{ConversationTurn, Role};
use tracing::debug;

/// Placed between the plan response and the auxiliary outputs of a round.
pub const AUXILIARY_SEPARATOR: &str = " | auxiliary: ";

/// Ordered turn history for one session.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<ConversationTurn>,
}

impl ConversationState {
    /// Start a history seeded with one system turn.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![ConversationTurn::system(system_prompt)],
        }
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        debug!(role = ?turn.role, len = self.turns.len() + 1, "conversation turn appended");
        self.turns.push(turn);
    }

    /// Immutable ordered copy of the history.  Later appends are not visible
    /// through it.
    pub fn snapshot(&self) -> Arc<[ConversationTurn]> {
        Arc::from(self.turns.as_slice())
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent turn with `role`, if any.
    pub fn last(&self, role: Role) -> Option<&ConversationTurn> {
        self.turns.iter().rev().find(|t| t.role == role)
    }
}

/// Build the assistant turn recorded after a round.
///
/// Auxiliary outputs are appended after [`AUXILIARY_SEPARATOR`], joined by
/// `"; "`, and only when there is at least one.
pub fn assistant_turn(response: &str, auxiliary: &[String]) -> ConversationTurn {
    if auxiliary.is_empty() {
        ConversationTurn::assistant(response)
    } else {
        ConversationTurn::assistant(format!(
            "{response}{AUXILIARY_SEPARATOR}{}",
            auxiliary.join("; ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_holds_only_the_system_turn() {
        let state = ConversationState::new("You are a robot arm.");
        assert_eq!(state.len(), 1);
        assert_eq!(state.snapshot()[0].role, Role::System);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_appends() {
        let mut state = ConversationState::new("sys");
        let before = state.snapshot();
        state.append(ConversationTurn::user("hello"));
        assert_eq!(before.len(), 1);
        assert_eq!(state.snapshot().len(), 2);
        assert_eq!(state.last(Role::User).unwrap().content, "hello");
    }

    #[test]
    fn assistant_turn_without_auxiliary_is_the_response() {
        let turn = assistant_turn("Done.", &[]);
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.content, "Done.");
    }

    #[test]
    fn assistant_turn_joins_auxiliary_outputs() {
        let turn = assistant_turn(
            "Looking.",
            &["I can see a cup".to_string(), "pump is off".to_string()],
        );
        assert_eq!(turn.content, "Looking. | auxiliary: I can see a cup; pump is off");
    }
}
