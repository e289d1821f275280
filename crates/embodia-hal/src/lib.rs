//! `embodia-hal` – hardware abstraction for the action side of the loop.
//!
//! # Modules
//!
//! - [`actuator`] – the [`Actuator`] trait every driver implements, the
//!   [`Actuation`] it returns, and the [`ActuatorError`] it fails with.
//! - [`registry`] – [`ActuatorRegistry`]: the actuator capability set.  Maps
//!   each action name to the driver that implements it and commands the
//!   documented safe state across all drivers.
//! - [`sim`] – simulated desktop arm, suction pump, LED and camera for tests,
//!   CI and offline demos.

pub mod actuator;
pub mod registry;
pub mod sim;

pub use actuator::{Actuation, Actuator, ActuatorError, FnActuator};
pub use registry::ActuatorRegistry;
