//! `embodia-memory` – session memory.
//!
//! # Modules
//!
//! - [`conversation`] – [`ConversationState`]: the append-only turn history
//!   that is the only state carried across rounds.

pub mod conversation;

pub use conversation::{AUXILIARY_SEPARATOR, ConversationState, assistant_turn};
