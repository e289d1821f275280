//! `embodia-kernel` – plan safety gate.
//!
//! Nothing the reasoning backend proposes reaches an actuator without passing
//! through this crate.  It does not think; it enforces rules.
//!
//! # Modules
//!
//! - [`plan_validator`] – [`PlanValidator`]: checks every call of an
//!   [`ActionPlan`][embodia_types::ActionPlan] against the registered action
//!   catalog and rejects the whole plan on the first mismatch.
//! - [`dependency_policy`] – [`DependencyPolicy`]: decides which subsystems
//!   are skipped for the rest of a round once another one has failed.

pub mod dependency_policy;
pub mod plan_validator;

pub use dependency_policy::{DependencyPolicy, FaultLedger};
pub use plan_validator::{PlanValidator, ValidatedCall, ValidatedPlan};
