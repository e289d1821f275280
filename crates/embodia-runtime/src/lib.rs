//! `embodia-runtime` – the agent's control loop.
//!
//! # Modules
//!
//! - [`session`] – [`Session`]: drives rounds of
//!   Synchronize → Fuse → Plan → Validate → Dispatch → Append → Emit, applies
//!   the error taxonomy, and commands the safe state on the way in and out.
//! - [`planner`] – [`PlanningClient`]: timeout-bounded request to the
//!   reasoning backend with an optional single corrective retry.
//! - [`plan_codec`] – wire plan decoding and the literal-only call parser.
//!   Backend text is parsed, never executed.
//! - [`dispatcher`] – [`Dispatcher`]: the `actuator-worker` thread and the
//!   per-action fault isolation and dependency policy.
//! - [`backend`] – the [`ReasoningBackend`] trait.
//! - [`llm_driver`] – [`LlmDriver`]: an OpenAI-compatible backend over
//!   `reqwest`, forcing the plan schema through `response_format`.
//! - [`prompt`] – system prompt generated from the action catalog.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: `tracing`
//!   subscriber setup with an optional OTLP span exporter.

pub mod backend;
pub mod dispatcher;
pub mod llm_driver;
pub mod plan_codec;
pub mod planner;
pub mod prompt;
pub mod session;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use backend::ReasoningBackend;
pub use dispatcher::{DispatchReport, Dispatcher, execute_plan};
pub use llm_driver::{LlmDriver, LlmError};
pub use planner::{Planned, PlannerConfig, PlanningClient};
pub use session::{Responder, RoundOutcome, Session, SessionConfig, SessionEnd};
pub use telemetry::{TracerProviderGuard, init_tracing};
