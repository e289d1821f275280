//! [`ActuatorRegistry`] – the actuator capability set.
//!
//! The registry stores every registered [`Actuator`] driver and a route from
//! each advertised action name to the driver implementing it.  The planner's
//! catalog, the validator's signature table and the dispatcher's invocations
//! all resolve through it.
//!
//! # Safe state
//!
//! [`ActuatorRegistry::command_safe_state`] asks every driver to go idle.  It
//! is issued at startup, at shutdown and after any safety-critical fault.

use std::collections::{BTreeMap, HashMap};

use embodia_types::{ActionSignature, ArgValue};
use tracing::{info, warn};

use crate::actuator::{Actuation, Actuator, ActuatorError};

struct Route {
    device: String,
    signature: ActionSignature,
}

/// Central driver registry and action router.
#[derive(Default)]
pub struct ActuatorRegistry {
    devices: HashMap<String, Box<dyn Actuator>>,
    routes: BTreeMap<String, Route>,
}

impl ActuatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver.  A driver with the same `id` is replaced, and any
    /// action it advertises is routed to it, overriding earlier routes.
    pub fn register(&mut self, actuator: Box<dyn Actuator>) {
        let device = actuator.id().to_string();
        self.routes.retain(|_, route| route.device != device);
        for signature in actuator.actions() {
            self.routes.insert(
                signature.name.clone(),
                Route {
                    device: device.clone(),
                    signature,
                },
            );
        }
        self.devices.insert(device, actuator);
    }

    /// Every registered action signature, sorted by name.
    pub fn catalog(&self) -> Vec<ActionSignature> {
        self.routes.values().map(|r| r.signature.clone()).collect()
    }

    pub fn signature(&self, action: &str) -> Option<&ActionSignature> {
        self.routes.get(action).map(|r| &r.signature)
    }

    pub fn contains(&self, action: &str) -> bool {
        self.routes.contains_key(action)
    }

    /// Invoke `action` on the driver that implements it.
    ///
    /// # Errors
    ///
    /// Returns [`ActuatorError::NotRegistered`] when no driver advertises the
    /// action, or the driver's own error.
    pub fn invoke(&mut self, action: &str, args: &[ArgValue]) -> Result<Actuation, ActuatorError> {
        let device = self
            .routes
            .get(action)
            .map(|r| r.device.clone())
            .ok_or_else(|| ActuatorError::NotRegistered(action.to_string()))?;
        match self.devices.get_mut(&device) {
            Some(driver) => driver.invoke(action, args),
            None => Err(ActuatorError::NotRegistered(action.to_string())),
        }
    }

    /// Command every driver to its safe state.
    ///
    /// Every driver is attempted even if an earlier one fails; the first
    /// failure is returned.
    pub fn command_safe_state(&mut self) -> Result<(), ActuatorError> {
        let mut ids: Vec<String> = self.devices.keys().cloned().collect();
        ids.sort();
        let mut first_err = None;
        for id in ids {
            if let Some(driver) = self.devices.get_mut(&id)
                && let Err(e) = driver.safe_state()
            {
                warn!(device = %id, error = %e, "safe state command failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => {
                info!("all actuators in safe state");
                Ok(())
            }
        }
    }
}
