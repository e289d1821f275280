//! Bounded perception queues between the capture producers and the
//! [`InputSynchronizer`](../../embodia_perception/synchronizer/index.html).
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood.  The producer side
//! ([`PerceptionBus`]) is cheap to clone and never blocks; the consumer side
//! ([`PerceptionStreams`]) is created together with the bus so events pushed
//! before the synchronizer starts are not lost.
//!
//! # Backpressure
//!
//! Both queues are **drop-oldest**.  When a queue is full (e.g. while the
//! session is busy planning or dispatching) the next push evicts the oldest
//! buffered event.  The consumer learns about the gap on its next receive and
//! logs how many events were discarded.
//!
//! | Queue | Producer | Typical traffic |
//! |---|---|---|
//! | transcripts | speech recognizer, REPL | one event per utterance |
//! | vision | object detector, [`FeedbackChannel`](crate::feedback::FeedbackChannel) | refreshed scene summaries |
//!
//! The feedback path pushes through a [`VisionSender`] whose events are marked
//! as feedback.  It does not count as a producer: once every [`PerceptionBus`]
//! clone is gone, [`PerceptionStreams::producers_alive`] turns `false` even
//! though the vision queue itself stays open.

use std::sync::{Arc, Weak};

use chrono::Utc;
use embodia_types::{AgentError, TranscriptEvent, VisionEvent, VisualObject};
use tokio::sync::broadcast;
use tracing::warn;

/// Default queue capacity (events buffered before the oldest is dropped).
pub const DEFAULT_CAPACITY: usize = 32;

/// Create a linked producer/consumer pair with `capacity` slots per queue.
///
/// # Panics
///
/// Panics if `capacity` is zero (a tokio broadcast requirement).
pub fn perception_channel(capacity: usize) -> (PerceptionBus, PerceptionStreams) {
    let (transcripts, transcript_rx) = broadcast::channel(capacity);
    let (vision, vision_rx) = broadcast::channel(capacity);
    let producer = Arc::new(());
    let producers = Arc::downgrade(&producer);
    (
        PerceptionBus {
            transcripts,
            vision: VisionSender {
                tx: vision,
                from_feedback: false,
            },
            _producer: producer,
        },
        PerceptionStreams {
            transcripts: QueueReceiver::new("transcripts", transcript_rx),
            vision: QueueReceiver::new("vision", vision_rx),
            producers,
        },
    )
}

/// Producer handle.  Clone it freely – all clones feed the same queues.
#[derive(Clone, Debug)]
pub struct PerceptionBus {
    transcripts: broadcast::Sender<TranscriptEvent>,
    vision: VisionSender,
    _producer: Arc<()>,
}

impl PerceptionBus {
    /// Push a recognised utterance, stamped with the current time.
    ///
    /// Returns [`AgentError::Channel`] when the synchronizer has gone away.
    pub fn push_transcript(&self, text: impl Into<String>) -> Result<(), AgentError> {
        let event = TranscriptEvent {
            text: text.into(),
            arrived_at: Utc::now(),
        };
        self.transcripts
            .send(event)
            .map(|_| ())
            .map_err(|_| AgentError::Channel("transcript queue has no consumer".into()))
    }

    /// Push a visual summary, stamped with the current time.
    pub fn push_vision(&self, objects: Vec<VisualObject>) -> Result<(), AgentError> {
        self.vision.push(objects)
    }

    /// A feedback handle onto the vision queue.  It does not keep the
    /// session's producers alive, and its events are marked
    /// [`VisionEvent::from_feedback`].
    pub fn vision_sender(&self) -> VisionSender {
        VisionSender {
            tx: self.vision.tx.clone(),
            from_feedback: true,
        }
    }
}

/// Vision-only push handle, used by the feedback path.
#[derive(Clone, Debug)]
pub struct VisionSender {
    tx: broadcast::Sender<VisionEvent>,
    from_feedback: bool,
}

impl VisionSender {
    pub fn push(&self, objects: Vec<VisualObject>) -> Result<(), AgentError> {
        let event = VisionEvent {
            objects,
            arrived_at: Utc::now(),
            from_feedback: self.from_feedback,
        };
        self.tx
            .send(event)
            .map(|_| ())
            .map_err(|_| AgentError::Channel("vision queue has no consumer".into()))
    }
}

/// Outcome of a non-blocking receive.
#[derive(Debug, PartialEq)]
pub enum Polled<T> {
    Ready(T),
    Empty,
    Closed,
}

/// Consumer half, owned by exactly one synchronizer.
///
/// The two queues are separate fields so both can be awaited concurrently.
pub struct PerceptionStreams {
    pub transcripts: QueueReceiver<TranscriptEvent>,
    pub vision: QueueReceiver<VisionEvent>,
    producers: Weak<()>,
}

impl PerceptionStreams {
    /// `true` while at least one [`PerceptionBus`] clone exists.
    pub fn producers_alive(&self) -> bool {
        self.producers.strong_count() > 0
    }
}

/// Receiving end of one perception queue.
pub struct QueueReceiver<T> {
    queue: &'static str,
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> QueueReceiver<T> {
    fn new(queue: &'static str, rx: broadcast::Receiver<T>) -> Self {
        Self { queue, rx }
    }

    /// Wait for the next event.  Returns `None` once every producer has been
    /// dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        recv_skipping_lag(&mut self.rx, self.queue).await
    }

    /// Non-blocking receive of the next buffered event.
    pub fn try_recv(&mut self) -> Polled<T> {
        try_recv_skipping_lag(&mut self.rx, self.queue)
    }
}

async fn recv_skipping_lag<T: Clone>(rx: &mut broadcast::Receiver<T>, queue: &str) -> Option<T> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(queue, dropped = n, "perception queue overflowed; oldest events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

fn try_recv_skipping_lag<T: Clone>(rx: &mut broadcast::Receiver<T>, queue: &str) -> Polled<T> {
    loop {
        match rx.try_recv() {
            Ok(event) => return Polled::Ready(event),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                warn!(queue, dropped = n, "perception queue overflowed; oldest events dropped");
                continue;
            }
            Err(broadcast::error::TryRecvError::Empty) => return Polled::Empty,
            Err(broadcast::error::TryRecvError::Closed) => return Polled::Closed,
        }
    }
}
