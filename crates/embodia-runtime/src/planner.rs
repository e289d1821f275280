//! [`PlanningClient`] – fused context plus history in, typed plan out.
//!
//! The client never writes to the session's [`ConversationState`].  It builds
//! a working copy of the history, appends the round's user turn, and hands
//! that user turn back with the plan so the session can record it once the
//! round has been dispatched.
//!
//! Every backend call is bounded by [`PlannerConfig::timeout`].  Backend
//! failures are never retried here.  A malformed reply may be followed by a
//! single corrective request when [`PlannerConfig::malformed_retry`] is set.

use std::sync::Arc;
use std::time::Duration;

use embodia_memory::ConversationState;
use embodia_types::{ActionPlan, AgentError, ConversationTurn, FusedContext};
use tracing::{debug, info, warn};

use crate::backend::ReasoningBackend;
use crate::plan_codec::{PLAN_FORMAT_CONTRACT, decode_plan};

/// Sent back to the backend after a reply that did not decode.
pub const CORRECTION_HINT: &str = "Your previous reply could not be parsed. Reply again with \
exactly one JSON object {\"response\": ..., \"function\": [...]} and nothing else.";

#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    /// Upper bound on each backend call.
    pub timeout: Duration,
    /// Allow one corrective retry after a malformed reply.
    pub malformed_retry: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            malformed_retry: true,
        }
    }
}

/// A decoded plan and the user turn that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Planned {
    pub plan: ActionPlan,
    pub user_turn: ConversationTurn,
}

pub struct PlanningClient {
    backend: Arc<dyn ReasoningBackend>,
    config: PlannerConfig,
}

impl PlanningClient {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: PlannerConfig) -> Self {
        Self { backend, config }
    }

    /// Ask the backend for the plan of one round.
    ///
    /// # Errors
    ///
    /// - [`AgentError::BackendTimeout`] – a backend call exceeded the timeout.
    /// - [`AgentError::BackendUnavailable`] – the backend call failed.
    /// - [`AgentError::MalformedPlan`] – the reply (and the retry, if any)
    ///   did not decode.
    pub async fn plan(
        &self,
        context: &FusedContext,
        state: &ConversationState,
    ) -> Result<Planned, AgentError> {
        let user_turn = ConversationTurn::user(context.render());
        let mut working = state.snapshot().to_vec();
        working.push(user_turn.clone());

        let reply = self.ask(&working).await?;
        let plan = match decode_plan(&reply) {
            Ok(plan) => plan,
            Err(AgentError::MalformedPlan(reason)) if self.config.malformed_retry => {
                warn!(%reason, "malformed plan; asking the backend to correct it");
                working.push(ConversationTurn::assistant(reply));
                working.push(ConversationTurn::user(format!("{CORRECTION_HINT} ({reason})")));
                decode_plan(&self.ask(&working).await?)?
            }
            Err(e) => return Err(e),
        };

        info!(actions = plan.actions.len(), "plan received");
        debug!(response = %plan.response, actions = ?plan.actions, "plan contents");
        Ok(Planned { plan, user_turn })
    }

    async fn ask(&self, turns: &[ConversationTurn]) -> Result<String, AgentError> {
        match tokio::time::timeout(
            self.config.timeout,
            self.backend.complete(PLAN_FORMAT_CONTRACT, turns),
        )
        .await
        {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(AgentError::BackendUnavailable(e.to_string())),
            Err(_) => Err(AgentError::BackendTimeout {
                timeout_ms: u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}
