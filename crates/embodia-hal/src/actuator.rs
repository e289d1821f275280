//! Generic `Actuator` trait for arms, pumps, LEDs and any other device the
//! planner can command.
//!
//! A driver advertises the actions it implements as [`ActionSignature`]s and
//! registers itself with an
//! [`ActuatorRegistry`][crate::registry::ActuatorRegistry].  The rest of the
//! system only ever talks to the trait, so drivers can be swapped without
//! touching planning logic.

use embodia_types::{ActionSignature, ArgValue, VisualObject};
use thiserror::Error;

/// What a successful action produced besides moving hardware.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Actuation {
    /// Auxiliary status text to be folded into the spoken response.
    pub auxiliary: Option<String>,
    /// Refreshed visual state, forwarded to perception by the feedback channel.
    pub observation: Option<Vec<VisualObject>>,
}

impl Actuation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn say(text: impl Into<String>) -> Self {
        Self {
            auxiliary: Some(text.into()),
            observation: None,
        }
    }

    pub fn observed(objects: Vec<VisualObject>) -> Self {
        Self {
            auxiliary: None,
            observation: Some(objects),
        }
    }
}

/// Failures raised by actuator drivers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActuatorError {
    #[error("fault on {component}: {details}")]
    Fault { component: String, details: String },

    #[error("{component} timed out executing {action}")]
    Timeout { component: String, action: String },

    /// The control channel to the device is gone.  Safety-critical.
    #[error("control link to {component} lost: {details}")]
    LinkLost { component: String, details: String },

    #[error("{action}: invalid argument: {details}")]
    BadArgument { action: String, details: String },

    #[error("action '{0}' is not registered")]
    NotRegistered(String),
}

impl ActuatorError {
    /// Faults that must end the session after the safe state is commanded.
    pub fn is_safety_critical(&self) -> bool {
        matches!(self, ActuatorError::LinkLost { .. })
    }
}

/// A device that implements one or more plan actions.
pub trait Actuator: Send {
    /// Stable device identifier, e.g. `"arm"` or `"pump"`.
    fn id(&self) -> &str;

    /// Every action this device implements.
    fn actions(&self) -> Vec<ActionSignature>;

    /// Execute `action` with already-validated `args`.  Blocking.
    ///
    /// # Errors
    ///
    /// Returns an [`ActuatorError`] when the device cannot complete the
    /// action.
    fn invoke(&mut self, action: &str, args: &[ArgValue]) -> Result<Actuation, ActuatorError>;

    /// Drive the device to its documented idle state (arm at zero, pump off,
    /// LED off, ...).
    fn safe_state(&mut self) -> Result<(), ActuatorError> {
        Ok(())
    }
}

type Handler = Box<dyn FnMut(&[ArgValue]) -> Result<Actuation, ActuatorError> + Send>;

/// Single-action device backed by a closure.
pub struct FnActuator {
    signature: ActionSignature,
    handler: Handler,
}

impl FnActuator {
    pub fn new<F>(signature: ActionSignature, handler: F) -> Box<Self>
    where
        F: FnMut(&[ArgValue]) -> Result<Actuation, ActuatorError> + Send + 'static,
    {
        Box::new(Self {
            signature,
            handler: Box::new(handler),
        })
    }
}

impl Actuator for FnActuator {
    fn id(&self) -> &str {
        &self.signature.name
    }

    fn actions(&self) -> Vec<ActionSignature> {
        vec![self.signature.clone()]
    }

    fn invoke(&mut self, action: &str, args: &[ArgValue]) -> Result<Actuation, ActuatorError> {
        if action != self.signature.name {
            return Err(ActuatorError::NotRegistered(action.to_string()));
        }
        (self.handler)(args)
    }
}
