//! The reasoning backend seam.
//!
//! Every backend (the OpenAI-compatible [`LlmDriver`][crate::llm_driver::LlmDriver],
//! the scripted backend used in tests) implements [`ReasoningBackend`]: ordered
//! `{role, content}` turns plus a system preamble in, free text out.

use async_trait::async_trait;
use embodia_types::{ConversationTurn, Role};

use crate::llm_driver::LlmError;

#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Complete the conversation.  `preamble` must reach the model as part of
    /// the system instructions; see [`with_preamble`].
    async fn complete(&self, preamble: &str, turns: &[ConversationTurn]) -> Result<String, LlmError>;
}

/// Append `preamble` to every system turn, or prepend a system turn holding
/// only the preamble when there is none.
pub fn with_preamble(preamble: &str, turns: &[ConversationTurn]) -> Vec<ConversationTurn> {
    let mut out: Vec<ConversationTurn> = turns
        .iter()
        .map(|t| match t.role {
            Role::System => ConversationTurn::system(format!("{}\n\n{preamble}", t.content)),
            _ => t.clone(),
        })
        .collect();
    if !out.iter().any(|t| t.role == Role::System) {
        out.insert(0, ConversationTurn::system(preamble));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_is_appended_to_system_turns() {
        let turns = vec![
            ConversationTurn::system("You drive a robot arm."),
            ConversationTurn::user("wave"),
        ];
        let out = with_preamble("Reply in JSON.", &turns);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "You drive a robot arm.\n\nReply in JSON.");
        assert_eq!(out[1], turns[1]);
    }

    #[test]
    fn preamble_becomes_system_turn_when_missing() {
        let out = with_preamble("Reply in JSON.", &[ConversationTurn::user("wave")]);
        assert_eq!(out[0], ConversationTurn::system("Reply in JSON."));
        assert_eq!(out.len(), 2);
    }
}
