//! [`FeedbackChannel`] – closes the loop from execution back to perception.
//!
//! After a round has been dispatched, every [`ActionResult`] that carries a
//! refreshed visual observation is forwarded to the vision queue so the next
//! round's snapshot reflects the post-action world.  Nothing is transformed
//! here.

use embodia_types::{ActionResult, AgentError};
use tracing::debug;

use crate::bus::{PerceptionBus, VisionSender};

/// Routes execution outcomes to the synchronizer's vision queue.
#[derive(Clone, Debug)]
pub struct FeedbackChannel {
    vision: VisionSender,
}

impl FeedbackChannel {
    /// Feed `bus`'s vision queue without counting as one of its producers.
    pub fn new(bus: &PerceptionBus) -> Self {
        Self {
            vision: bus.vision_sender(),
        }
    }

    /// Forward observations from `results`, in plan order.
    ///
    /// Returns how many visual summaries were forwarded.
    pub fn emit(&self, results: &[ActionResult]) -> Result<usize, AgentError> {
        let mut forwarded = 0;
        for result in results {
            if let Some(objects) = &result.observation {
                debug!(action = %result.call.name, objects = objects.len(), "forwarding observation");
                self.vision.push(objects.clone())?;
                forwarded += 1;
            }
        }
        Ok(forwarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Polled, perception_channel};
    use embodia_types::{ActionCall, ErrorKind, VisualObject};

    #[test]
    fn only_observations_are_forwarded() {
        let (bus, mut streams) = perception_channel(8);
        let feedback = FeedbackChannel::new(&bus);
        let results = vec![
            ActionResult::success(0, ActionCall::new("move_to_zero", vec![]), None, None),
            ActionResult::success(
                1,
                ActionCall::new("top_view_shot", vec![]),
                None,
                Some(vec![VisualObject::new("green block").at(210, 140)]),
            ),
            ActionResult::failure(
                2,
                ActionCall::new("pump_on", vec![]),
                ErrorKind::ActuatorFault("stall".into()),
            ),
        ];

        assert_eq!(feedback.emit(&results).unwrap(), 1);
        match streams.vision.try_recv() {
            Polled::Ready(event) => assert_eq!(event.objects[0].label, "green block"),
            other => panic!("expected forwarded observation, got {other:?}"),
        }
        assert_eq!(streams.vision.try_recv(), Polled::Empty);
    }

    #[test]
    fn nothing_to_forward_is_not_an_error() {
        let (bus, _streams) = perception_channel(8);
        let feedback = FeedbackChannel::new(&bus);
        assert_eq!(feedback.emit(&[]).unwrap(), 0);
    }
}
