//! `embodia-perception` – turning raw modality events into reasoning input.
//!
//! # Modules
//!
//! - [`synchronizer`] – [`InputSynchronizer`][synchronizer::InputSynchronizer]:
//!   aligns independently arriving transcripts and visual summaries into one
//!   [`PerceptionSnapshot`][embodia_types::PerceptionSnapshot] per round under
//!   a single round timeout.
//! - [`fusion`] – [`ContextFuser`][fusion::ContextFuser]: a pure function from
//!   snapshot to [`FusedContext`][embodia_types::FusedContext] that degrades
//!   gracefully when a modality is missing.

pub mod fusion;
pub mod synchronizer;

pub use fusion::ContextFuser;
pub use synchronizer::InputSynchronizer;
