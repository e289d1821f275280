//! [`Session`] – the perception-to-action loop.
//!
//! One round:
//!
//! 1. **Synchronize** – wait for a transcript and a visual summary under one
//!    round timeout.
//! 2. **Fuse** – turn the snapshot into reasoning context.
//! 3. **Plan** – ask the reasoning backend for a typed plan.
//! 4. **Validate** – reject the whole plan if any call does not match the
//!    catalog.
//! 5. **Dispatch** – run the plan on the `actuator-worker` thread.
//! 6. **Append** – record the user turn and the assistant turn.
//! 7. **Emit** – forward refreshed visual state to the vision queue.
//!
//! Rounds never overlap.  A round that fails before dispatch leaves the
//! conversation untouched.  The safe state is commanded at startup, after a
//! safety-critical fault, and before [`Session::run`] returns.  With
//! [`SessionConfig::rehome_each_round`] it is also commanded between fusing
//! and planning, so idle rounds never move hardware.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use embodia_hal::ActuatorRegistry;
use embodia_kernel::{DependencyPolicy, PlanValidator};
use embodia_memory::{ConversationState, assistant_turn};
use embodia_middleware::{FeedbackChannel, PerceptionBus, PerceptionStreams};
use embodia_perception::fusion::DEFAULT_MAX_OBJECTS;
use embodia_perception::{ContextFuser, InputSynchronizer};
use embodia_types::{ActionResult, AgentError};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::backend::ReasoningBackend;
use crate::dispatcher::Dispatcher;
use crate::planner::{PlannerConfig, PlanningClient};
use crate::prompt::system_prompt;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Single deadline for gathering both modalities in a round.
    pub sync_timeout: Duration,
    pub planner: PlannerConfig,
    /// Command the safe state before planning each round that has a stimulus.
    pub rehome_each_round: bool,
    pub policy: DependencyPolicy,
    /// Objects described per scene; the rest are summarised.
    pub max_scene_objects: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sync_timeout: Duration::from_secs(3),
            planner: PlannerConfig::default(),
            rehome_each_round: false,
            policy: DependencyPolicy::default(),
            max_scene_objects: DEFAULT_MAX_OBJECTS,
        }
    }
}

/// What one dispatched round produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    pub response: String,
    pub results: Vec<ActionResult>,
    /// The assistant turn recorded in the conversation.
    pub assistant_turn: String,
    /// Set when a safety-critical fault halted the plan.
    pub safety_fault: Option<AgentError>,
}

/// Receives what the user should hear.
pub trait Responder: Send {
    fn on_reply(&mut self, outcome: &RoundOutcome);
    fn on_error(&mut self, error: &AgentError);
}

/// Why [`Session::run`] stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The shutdown flag was raised.
    Shutdown,
    /// Every perception producer went away.
    PerceptionClosed,
}

pub struct Session {
    config: SessionConfig,
    synchronizer: InputSynchronizer,
    fuser: ContextFuser,
    planner: PlanningClient,
    validator: PlanValidator,
    dispatcher: Dispatcher,
    feedback: FeedbackChannel,
    conversation: ConversationState,
    responder: Box<dyn Responder>,
    shutdown: Arc<AtomicBool>,
    round: u64,
}

impl Session {
    /// Wire a session around `registry`, consuming perception from `streams`.
    ///
    /// `bus` is only used to route feedback; it does not keep the session's
    /// perception open.
    pub fn new(
        config: SessionConfig,
        bus: &PerceptionBus,
        streams: PerceptionStreams,
        registry: ActuatorRegistry,
        backend: Arc<dyn ReasoningBackend>,
        responder: Box<dyn Responder>,
    ) -> Result<Self, AgentError> {
        let catalog = registry.catalog();
        let conversation = ConversationState::new(system_prompt(&catalog));
        let validator = PlanValidator::new(catalog);
        let dispatcher = Dispatcher::spawn(registry, config.policy.clone())?;
        Ok(Self {
            synchronizer: InputSynchronizer::new(streams),
            fuser: ContextFuser::new(config.max_scene_objects),
            planner: PlanningClient::new(backend, config.planner.clone()),
            validator,
            dispatcher,
            feedback: FeedbackChannel::new(bus),
            conversation,
            responder,
            shutdown: Arc::new(AtomicBool::new(false)),
            round: 0,
            config,
        })
    }

    /// Raise this flag to stop the session after the current round.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    /// Drive rounds until shutdown, closed perception, or a fatal fault.
    ///
    /// The safe state is commanded before the first round and before
    /// returning, whatever the outcome.
    ///
    /// # Errors
    ///
    /// [`AgentError::SafetyCritical`] when a fault (or the safe state itself)
    /// ended the session.
    pub async fn run(&mut self) -> Result<SessionEnd, AgentError> {
        info!(actions = self.dispatcher.catalog().len(), "session starting");
        let outcome = match self.dispatcher.command_safe_state().await {
            Ok(()) => self.drive().await,
            Err(e) => {
                error!(error = %e, "safe state failed at startup");
                Err(e)
            }
        };

        let parked = self.dispatcher.command_safe_state().await;
        if let Err(e) = &parked {
            error!(error = %e, "safe state failed at shutdown");
        }
        match outcome {
            Ok(end) => {
                info!(?end, rounds = self.round, "session ended");
                parked.map(|()| end)
            }
            Err(e) => Err(e),
        }
    }

    async fn drive(&mut self) -> Result<SessionEnd, AgentError> {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Ok(SessionEnd::Shutdown);
            }
            self.round += 1;
            let span = info_span!("round", round = self.round);
            match self.run_round().instrument(span).await {
                Ok(outcome) => {
                    self.responder.on_reply(&outcome);
                    if let Some(fault) = outcome.safety_fault {
                        error!(error = %fault, "halting session");
                        return Err(fault);
                    }
                }
                Err(AgentError::EmptyInput) => debug!("no new stimulus"),
                Err(AgentError::PerceptionClosed) => return Ok(SessionEnd::PerceptionClosed),
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "halting session");
                    self.responder.on_error(&e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "round failed");
                    self.responder.on_error(&e);
                }
            }
        }
    }

    /// Run exactly one round.
    pub async fn run_round(&mut self) -> Result<RoundOutcome, AgentError> {
        let snapshot = self.synchronizer.synchronize(self.config.sync_timeout).await?;
        let context = self.fuser.fuse(&snapshot)?;
        info!(snapshot = %snapshot.id, "perception fused");

        if self.config.rehome_each_round {
            self.dispatcher.command_safe_state().await?;
        }

        let planned = self.planner.plan(&context, &self.conversation).await?;
        let plan = self.validator.validate(planned.plan)?;
        let response = plan.response().to_string();

        let report = self.dispatcher.dispatch(plan).await?;
        let assistant = assistant_turn(&response, &report.auxiliary());
        let recorded = assistant.content.clone();
        self.conversation.append(planned.user_turn);
        self.conversation.append(assistant);

        match self.feedback.emit(&report.results) {
            Ok(0) => {}
            Ok(n) => debug!(observations = n, "feedback forwarded"),
            Err(e) => warn!(error = %e, "feedback not delivered"),
        }

        let failed = report.results.iter().filter(|r| !r.succeeded).count();
        info!(actions = report.results.len(), failed, "round dispatched");
        Ok(RoundOutcome {
            response,
            results: report.results,
            assistant_turn: recorded,
            safety_fault: report.safety_fault,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use embodia_hal::sim::{SAFE_STATE, SimFault, SimJournal, SimRigBuilder};
    use embodia_middleware::perception_channel;
    use embodia_types::{ErrorKind, Role, VisualObject};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Responder for Recorder {
        fn on_reply(&mut self, outcome: &RoundOutcome) {
            self.0.lock().unwrap().push(format!("reply: {}", outcome.response));
        }
        fn on_error(&mut self, error: &AgentError) {
            self.0.lock().unwrap().push(format!("error: {error}"));
        }
    }

    struct Harness {
        session: Session,
        bus: PerceptionBus,
        journal: SimJournal,
        backend: Arc<ScriptedBackend>,
        heard: Recorder,
    }

    fn harness(backend: ScriptedBackend, faults: &[(&str, SimFault)], config: SessionConfig) -> Harness {
        let scene = vec![
            VisualObject::new("green block").at(210, 140),
            VisualObject::new("basketball").at(80, 95),
        ];
        let mut rig = SimRigBuilder::full(scene);
        for (action, fault) in faults {
            rig = rig.with_fault(*action, *fault);
        }
        let (registry, journal) = rig.build();
        let (bus, streams) = perception_channel(8);
        let backend = Arc::new(backend);
        let heard = Recorder::default();
        let session = Session::new(
            config,
            &bus,
            streams,
            registry,
            backend.clone(),
            Box::new(heard.clone()),
        )
        .unwrap();
        Harness {
            session,
            bus,
            journal,
            backend,
            heard,
        }
    }

    fn quick() -> SessionConfig {
        SessionConfig {
            sync_timeout: Duration::from_millis(200),
            planner: PlannerConfig {
                timeout: Duration::from_secs(1),
                malformed_retry: false,
            },
            ..SessionConfig::default()
        }
    }

    fn say(h: &Harness, text: &str) {
        h.bus.push_transcript(text).unwrap();
        h.bus.push_vision(vec![VisualObject::new("green block")]).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn return_to_zero_end_to_end() {
        let mut h = harness(
            ScriptedBackend::new([r#"{"response":"Returning to zero.","function":["move_to_zero()"]}"#]),
            &[],
            quick(),
        );
        say(&h, "return to zero");

        let outcome = h.session.run_round().await.unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results[0].succeeded);
        assert_eq!(h.journal.calls(), vec!["move_to_zero()"]);

        let turns = h.session.conversation().snapshot();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].role, Role::User);
        assert!(turns[1].content.starts_with("return to zero"));
        assert_eq!(turns[2].content, "Returning to zero.");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_plan_adds_exactly_the_response() {
        let mut h = harness(ScriptedBackend::new([r#"{"response":"Hello!","function":[]}"#]), &[], quick());
        say(&h, "hi there");

        let outcome = h.session.run_round().await.unwrap();
        assert!(outcome.results.is_empty());
        let turns = h.session.conversation().snapshot();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[2].role, Role::Assistant);
        assert_eq!(turns[2].content, "Hello!");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_action_rejects_the_whole_plan() {
        let mut h = harness(
            ScriptedBackend::new([r#"{"response":"ok","function":["move_to_zero()","fly()"]}"#]),
            &[],
            quick(),
        );
        say(&h, "fly away");

        let err = h.session.run_round().await.unwrap_err();
        assert_eq!(
            err,
            AgentError::UnknownAction {
                index: 1,
                name: "fly".into()
            }
        );
        assert!(h.journal.calls().is_empty());
        assert_eq!(h.session.conversation().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_leaves_history_untouched() {
        let mut h = harness(
            ScriptedBackend::new([r#"{"response":"late"}"#]).slow(Duration::from_secs(10)),
            &[],
            quick(),
        );
        say(&h, "hello");
        let err = h.session.run_round().await.unwrap_err();
        assert_eq!(err, AgentError::BackendTimeout { timeout_ms: 1000 });
        assert_eq!(h.session.conversation().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_reply_leaves_history_untouched() {
        let mut h = harness(ScriptedBackend::new(["I'd love to help!"]), &[], quick());
        say(&h, "hello");
        let err = h.session.run_round().await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedPlan(_)));
        assert_eq!(h.session.conversation().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_is_empty_input() {
        let mut h = harness(ScriptedBackend::new(Vec::<String>::new()), &[], quick());
        let err = h.session.run_round().await.unwrap_err();
        assert_eq!(err, AgentError::EmptyInput);
        assert!(h.backend.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn auxiliary_output_is_folded_into_assistant_turn_and_feedback_flows() {
        let mut h = harness(
            ScriptedBackend::new([
                r#"{"response":"Let me look.","function":["top_view_shot()","vlm_vqa('what is here?')"]}"#,
                r#"{"response":"Done.","function":[]}"#,
            ]),
            &[],
            quick(),
        );
        say(&h, "what do you see?");
        let outcome = h.session.run_round().await.unwrap();
        assert_eq!(
            outcome.assistant_turn,
            "Let me look. | auxiliary: I can see green block, basketball"
        );

        // The observation from top_view_shot feeds the next round's snapshot.
        h.bus.push_transcript("thanks").unwrap();
        h.session.run_round().await.unwrap();
        let requests = h.backend.requests();
        let last_user = requests[1].last().unwrap();
        assert!(last_user.content.contains("basketball"));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_action_is_recorded_and_round_continues() {
        let mut h = harness(
            ScriptedBackend::new([
                r#"{"response":"ok","function":["head_shake()","pump_on()","llm_led('green')"]}"#,
            ]),
            &[("pump_on", SimFault::Fault)],
            quick(),
        );
        say(&h, "shake, grab, glow");
        let outcome = h.session.run_round().await.unwrap();
        let ok: Vec<bool> = outcome.results.iter().map(|r| r.succeeded).collect();
        assert_eq!(ok, vec![true, false, true]);
        assert_eq!(h.session.conversation().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn safety_fault_parks_hardware_and_ends_session() {
        let mut h = harness(
            ScriptedBackend::new([
                r#"{"response":"Nodding.","function":["head_nod()","pump_on()"]}"#,
            ]),
            &[("head_nod", SimFault::LinkLost)],
            quick(),
        );
        say(&h, "nod");

        let err = h.session.run().await.unwrap_err();
        assert!(matches!(err, AgentError::SafetyCritical { .. }));
        assert_eq!(
            h.journal.calls(),
            vec![
                "safe_state(arm)",
                "safe_state(led)",
                "safe_state(pump)",
                "head_nod()",
                "safe_state(arm)",
                "safe_state(led)",
                "safe_state(pump)",
            ]
        );
        assert_eq!(h.heard.0.lock().unwrap().clone(), vec!["reply: Nodding."]);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_reported_and_loop_ends_when_perception_closes() {
        let h = harness(
            ScriptedBackend::new([
                "not json",
                r#"{"response":"Shaking.","function":["head_shake()"]}"#,
            ]),
            &[],
            quick(),
        );
        say(&h, "first");
        say(&h, "second");
        let Harness {
            mut session,
            bus,
            journal,
            heard,
            ..
        } = h;
        drop(bus);

        assert_eq!(session.run().await.unwrap(), SessionEnd::PerceptionClosed);
        let heard = heard.0.lock().unwrap().clone();
        assert_eq!(heard.len(), 2);
        assert!(heard[0].starts_with("error: malformed plan"));
        assert_eq!(heard[1], "reply: Shaking.");
        assert_eq!(journal.calls().last().unwrap(), "safe_state(pump)");
        assert!(journal.calls().contains(&"head_shake()".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flag_stops_before_next_round() {
        let mut h = harness(ScriptedBackend::new(Vec::<String>::new()), &[], quick());
        h.session.shutdown_handle().store(true, Ordering::Release);
        assert_eq!(h.session.run().await.unwrap(), SessionEnd::Shutdown);
        assert!(h.backend.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rehome_each_round_parks_before_planning() {
        let config = SessionConfig {
            rehome_each_round: true,
            ..quick()
        };
        let mut h = harness(
            ScriptedBackend::new([r#"{"response":"Nodding.","function":["head_nod()"]}"#]),
            &[],
            config,
        );
        say(&h, "nod");
        h.session.run_round().await.unwrap();
        assert_eq!(
            h.journal.calls(),
            vec!["safe_state(arm)", "safe_state(led)", "safe_state(pump)", "head_nod()"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_rounds_do_not_rehome() {
        let config = SessionConfig {
            rehome_each_round: true,
            ..quick()
        };
        let mut h = harness(ScriptedBackend::new(Vec::<String>::new()), &[], config);
        for _ in 0..3 {
            assert_eq!(h.session.run_round().await.unwrap_err(), AgentError::EmptyInput);
        }
        assert!(h.journal.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_safe_state_ends_the_session() {
        let config = SessionConfig {
            rehome_each_round: true,
            ..quick()
        };
        let mut h = harness(
            ScriptedBackend::new(Vec::<String>::new()),
            &[(SAFE_STATE, SimFault::Panic)],
            config,
        );

        let err = h.session.run().await.unwrap_err();
        assert!(matches!(err, AgentError::SafetyCritical { .. }));
        assert!(h.backend.requests().is_empty());
        assert!(h.heard.0.lock().unwrap().is_empty());
        // Startup and shutdown each attempted the safe state once.
        let parked = h
            .journal
            .calls()
            .iter()
            .filter(|c| c.starts_with("safe_state"))
            .count();
        assert_eq!(parked, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn observation_alone_does_not_trigger_a_plan() {
        let mut h = harness(
            ScriptedBackend::new([
                r#"{"response":"Looking.","function":["top_view_shot()"]}"#,
                r#"{"response":"Dancing.","function":["head_dance()"]}"#,
            ]),
            &[],
            quick(),
        );
        say(&h, "look at the table");
        h.session.run_round().await.unwrap();

        let err = h.session.run_round().await.unwrap_err();
        assert_eq!(err, AgentError::EmptyInput);
        assert_eq!(h.backend.requests().len(), 1);
        assert_eq!(h.journal.calls(), vec!["top_view_shot()"]);

        // The observation still reaches the next real instruction.
        h.bus.push_transcript("what now?").unwrap();
        h.session.run_round().await.unwrap();
        let requests = h.backend.requests();
        let last_user = requests[1].last().unwrap();
        assert!(last_user.content.starts_with("what now?"));
        assert!(last_user.content.contains("basketball"));
    }

    #[tokio::test(start_paused = true)]
    async fn scene_object_cap_is_configurable() {
        let config = SessionConfig {
            max_scene_objects: 1,
            ..quick()
        };
        let mut h = harness(ScriptedBackend::new([r#"{"response":"Ok."}"#]), &[], config);
        h.bus.push_transcript("describe").unwrap();
        h.bus
            .push_vision(vec![VisualObject::new("cup"), VisualObject::new("ball")])
            .unwrap();
        h.session.run_round().await.unwrap();
        let requests = h.backend.requests();
        let user = &requests[0].last().unwrap().content;
        assert!(user.contains("cup"));
        assert!(!user.contains("ball"));
    }

    #[tokio::test(start_paused = true)]
    async fn dependency_abort_is_reported_per_action() {
        let mut h = harness(
            ScriptedBackend::new([
                r#"{"response":"ok","function":["move_to_coords(100, 50)","pump_on()"]}"#,
            ]),
            &[("move_to_coords", SimFault::Fault)],
            quick(),
        );
        say(&h, "pick it up");
        let outcome = h.session.run_round().await.unwrap();
        assert!(matches!(
            outcome.results[1].error,
            Some(ErrorKind::DependencyAborted { .. })
        ));
    }
}
