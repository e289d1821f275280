//! [`PlanValidator`] – the gate every plan passes before it reaches hardware.
//!
//! A plan returned by the reasoning backend is checked against the registered
//! action catalog.  Each call must name a registered action and supply
//! arguments whose count and kinds match the declared signature; an integer
//! literal is accepted where a float is declared.  The first failing call
//! rejects the **whole** plan, so nothing is ever partially dispatched.
//!
//! Validation is side-effect free.
//!
//! # Example
//!
//! ```
//! use embodia_kernel::PlanValidator;
//! use embodia_types::{ActionCall, ActionPlan, ActionSignature, ArgKind, ArgValue, Subsystem};
//!
//! let validator = PlanValidator::new(vec![
//!     ActionSignature::new("move_to_coords", vec![ArgKind::Float, ArgKind::Float], Subsystem::Arm),
//! ]);
//!
//! let plan = ActionPlan {
//!     response: "Moving.".into(),
//!     actions: vec![ActionCall::new("move_to_coords", vec![ArgValue::Int(10), ArgValue::Float(2.5)])],
//! };
//! let validated = validator.validate(plan).unwrap();
//! assert_eq!(validated.len(), 1);
//! ```

use std::collections::HashMap;

use embodia_types::{ActionCall, ActionPlan, ActionSignature, AgentError, ArgValue, Subsystem};
use tracing::warn;

/// One call that passed validation, annotated with its declared signature
/// metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCall {
    call: ActionCall,
    subsystem: Subsystem,
    recovery: bool,
}

impl ValidatedCall {
    pub fn call(&self) -> &ActionCall {
        &self.call
    }

    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    /// `true` when the action restores its subsystem to a known-good state.
    pub fn is_recovery(&self) -> bool {
        self.recovery
    }
}

/// A plan whose every call matches the catalog.  Only [`PlanValidator`] can
/// build one.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPlan {
    response: String,
    calls: Vec<ValidatedCall>,
}

impl ValidatedPlan {
    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn calls(&self) -> &[ValidatedCall] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Checks plans against a fixed action catalog.
#[derive(Debug, Clone, Default)]
pub struct PlanValidator {
    catalog: HashMap<String, ActionSignature>,
}

impl PlanValidator {
    /// Build a validator over `catalog`.  Later duplicates replace earlier ones.
    pub fn new(catalog: impl IntoIterator<Item = ActionSignature>) -> Self {
        Self {
            catalog: catalog
                .into_iter()
                .map(|sig| (sig.name.clone(), sig))
                .collect(),
        }
    }

    /// Validate every call in `plan`, in order.
    ///
    /// # Errors
    ///
    /// - [`AgentError::UnknownAction`] – a call names an unregistered action.
    /// - [`AgentError::ArgumentMismatch`] – wrong argument count or kind.
    pub fn validate(&self, plan: ActionPlan) -> Result<ValidatedPlan, AgentError> {
        let mut calls = Vec::with_capacity(plan.actions.len());
        for (index, call) in plan.actions.into_iter().enumerate() {
            let Some(sig) = self.catalog.get(&call.name) else {
                warn!(index, action = %call.name, "plan rejected: unknown action");
                return Err(AgentError::UnknownAction {
                    index,
                    name: call.name,
                });
            };

            let arity_ok = sig.params.len() == call.arguments.len();
            let kinds_ok = sig
                .params
                .iter()
                .zip(&call.arguments)
                .all(|(kind, value)| kind.accepts(value));
            if !arity_ok || !kinds_ok {
                let found = describe_args(&call.arguments);
                warn!(index, action = %call.name, %found, "plan rejected: argument mismatch");
                return Err(AgentError::ArgumentMismatch {
                    index,
                    expected: join(sig.params.iter()),
                    found,
                    name: call.name,
                });
            }

            calls.push(ValidatedCall {
                call,
                subsystem: sig.subsystem,
                recovery: sig.recovery,
            });
        }
        Ok(ValidatedPlan {
            response: plan.response,
            calls,
        })
    }
}

fn describe_args(args: &[ArgValue]) -> String {
    join(args.iter().map(ArgValue::kind))
}

fn join<T: ToString>(items: impl Iterator<Item = T>) -> String {
    items.map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use embodia_types::ArgKind;

    fn validator() -> PlanValidator {
        PlanValidator::new(vec![
            ActionSignature::new("move_to_zero", vec![], Subsystem::Arm).recovery(),
            ActionSignature::new(
                "single_joint_move",
                vec![ArgKind::Int, ArgKind::Float],
                Subsystem::Arm,
            ),
            ActionSignature::new("llm_led", vec![ArgKind::Str], Subsystem::Indicator),
        ])
    }

    fn plan(actions: Vec<ActionCall>) -> ActionPlan {
        ActionPlan {
            response: "ok".into(),
            actions,
        }
    }

    #[test]
    fn empty_plan_is_valid() {
        let validated = validator().validate(plan(vec![])).unwrap();
        assert!(validated.is_empty());
        assert_eq!(validated.response(), "ok");
    }

    #[test]
    fn valid_calls_carry_signature_metadata() {
        let validated = validator()
            .validate(plan(vec![
                ActionCall::new("move_to_zero", vec![]),
                ActionCall::new("llm_led", vec![ArgValue::Str("blue".into())]),
            ]))
            .unwrap();
        assert_eq!(validated.len(), 2);
        assert!(validated.calls()[0].is_recovery());
        assert_eq!(validated.calls()[1].subsystem(), Subsystem::Indicator);
    }

    #[test]
    fn unknown_action_names_its_index() {
        let err = validator()
            .validate(plan(vec![
                ActionCall::new("move_to_zero", vec![]),
                ActionCall::new("launch_rocket", vec![]),
            ]))
            .unwrap_err();
        assert_eq!(
            err,
            AgentError::UnknownAction {
                index: 1,
                name: "launch_rocket".into()
            }
        );
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let err = validator()
            .validate(plan(vec![ActionCall::new(
                "single_joint_move",
                vec![ArgValue::Str("one".into()), ArgValue::Float(30.0)],
            )]))
            .unwrap_err();
        assert_eq!(
            err,
            AgentError::ArgumentMismatch {
                index: 0,
                name: "single_joint_move".into(),
                expected: "int, float".into(),
                found: "str, float".into(),
            }
        );
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let err = validator()
            .validate(plan(vec![ActionCall::new(
                "move_to_zero",
                vec![ArgValue::Int(1)],
            )]))
            .unwrap_err();
        assert!(matches!(err, AgentError::ArgumentMismatch { index: 0, .. }));
    }

    #[test]
    fn int_literal_satisfies_float_param() {
        let result = validator().validate(plan(vec![ActionCall::new(
            "single_joint_move",
            vec![ArgValue::Int(2), ArgValue::Int(45)],
        )]));
        assert!(result.is_ok());
    }
}
