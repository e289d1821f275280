//! [`InputSynchronizer`] – aligns speech and vision into one snapshot.
//!
//! Each call to [`InputSynchronizer::synchronize`] waits until both a
//! transcript and a visual summary are available, or until the round timeout
//! elapses, whichever comes first.  A single deadline covers both modalities,
//! so round latency is bounded by `timeout` regardless of which producer is
//! silent.
//!
//! # Draining policy
//!
//! - **Transcripts**: the oldest queued utterance is taken; later utterances
//!   stay queued for later rounds.
//! - **Vision**: the queue is drained to its newest summary, since only the
//!   most recent world state is relevant.
//!
//! # Feedback
//!
//! Observations routed back from executed actions refresh the world state but
//! never start a round on their own.  When a round sees nothing but feedback
//! vision, the snapshot is empty and the newest feedback summary is carried
//! into the next round that has a real stimulus.

use std::time::Duration;

use embodia_middleware::{PerceptionStreams, Polled};
use embodia_types::{AgentError, PerceptionSnapshot, TranscriptEvent, VisionEvent};
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Sole consumer of the perception queues.
pub struct InputSynchronizer {
    streams: PerceptionStreams,
    transcripts_open: bool,
    vision_open: bool,
    /// Feedback vision from a round that had no stimulus.
    carried: Option<VisionEvent>,
}

impl InputSynchronizer {
    pub fn new(streams: PerceptionStreams) -> Self {
        Self {
            streams,
            transcripts_open: true,
            vision_open: true,
            carried: None,
        }
    }

    /// Produce the perception snapshot for the next round.
    ///
    /// Partial data is never an error: whichever modality is missing at the
    /// deadline is left empty, and an entirely empty snapshot means "no new
    /// stimulus".
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::PerceptionClosed`] only when both queues are
    /// closed (or only the feedback path still feeds vision) and nothing is
    /// left to deliver.
    pub async fn synchronize(&mut self, timeout: Duration) -> Result<PerceptionSnapshot, AgentError> {
        let deadline = Instant::now() + timeout;
        let mut transcript: Option<TranscriptEvent> = None;
        let mut vision: Option<VisionEvent> = self.carried.take();
        let mut fresh_vision = false;
        let mut transcripts_open = self.transcripts_open;
        let mut vision_open = self.vision_open;
        let streams = &mut self.streams;

        loop {
            let want_transcript = transcript.is_none() && transcripts_open;
            // Feedback alone does not end the wait while nothing else arrived.
            let feedback_only = !fresh_vision && transcript.is_none();
            // The feedback path keeps the vision queue open; stop waiting on it
            // once the real producers are gone.
            let want_vision =
                (vision.is_none() || feedback_only) && vision_open && streams.producers_alive();
            if !want_transcript && !want_vision {
                break;
            }

            tokio::select! {
                event = streams.transcripts.recv(), if want_transcript => match event {
                    Some(e) => transcript = Some(e),
                    None => transcripts_open = false,
                },
                event = streams.vision.recv(), if want_vision => match event {
                    Some(e) => {
                        fresh_vision |= !e.from_feedback;
                        vision = Some(e);
                    }
                    None => vision_open = false,
                },
                _ = sleep_until(deadline) => {
                    debug!(
                        has_transcript = transcript.is_some(),
                        has_vision = vision.is_some(),
                        "synchronizer deadline reached"
                    );
                    break;
                }
            }
        }

        self.transcripts_open = transcripts_open;
        self.vision_open = vision_open;
        if self.vision_open {
            fresh_vision |= self.drain_to_latest_vision(&mut vision);
        }

        if transcript.is_none() && !fresh_vision {
            let producers_gone =
                !self.transcripts_open && (!self.vision_open || !self.streams.producers_alive());
            if producers_gone {
                return Err(AgentError::PerceptionClosed);
            }
            if vision.is_some() {
                debug!("only feedback vision this round; carrying it forward");
            }
            self.carried = vision;
            return Ok(PerceptionSnapshot::new(None, None));
        }

        Ok(PerceptionSnapshot::new(
            transcript.map(|t| t.text),
            vision.map(|v| v.objects),
        ))
    }

    /// Replace `latest` with the newest buffered summary.  Returns `true`
    /// when any drained summary came from a real producer.
    fn drain_to_latest_vision(&mut self, latest: &mut Option<VisionEvent>) -> bool {
        let mut fresh = false;
        loop {
            match self.streams.vision.try_recv() {
                Polled::Ready(event) => {
                    fresh |= !event.from_feedback;
                    *latest = Some(event);
                }
                Polled::Empty => return fresh,
                Polled::Closed => {
                    self.vision_open = false;
                    return fresh;
                }
            }
        }
    }
}
