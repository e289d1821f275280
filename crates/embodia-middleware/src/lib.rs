//! `embodia-middleware` – perception plumbing.
//!
//! Moves events between the capture producers, the input synchronizer, and
//! the post-execution feedback path without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – bounded, drop-oldest transcript and vision queues built on
//!   Tokio broadcast channels.
//! - [`feedback`] – [`FeedbackChannel`]: forwards refreshed visual state from
//!   action results back into the vision queue.

pub mod bus;
pub mod feedback;

pub use bus::{
    DEFAULT_CAPACITY, PerceptionBus, PerceptionStreams, Polled, QueueReceiver, VisionSender,
    perception_channel,
};
pub use feedback::FeedbackChannel;
