//! In-process simulated robot for tests, CI and offline demos.
//!
//! [`SimRigBuilder`] populates an [`ActuatorRegistry`] with stub drivers that
//! mirror a desktop 6-DOF arm with a suction pump, an RGB status LED and a
//! top-view camera.  Every attempted invocation is recorded in a shared
//! [`SimJournal`], and faults can be injected per action name.
//!
//! # Action vocabulary
//!
//! | Action | Params | Subsystem | Notes |
//! |---|---|---|---|
//! | `move_to_zero` | – | arm | recovery |
//! | `relax_arms` | – | arm | |
//! | `head_shake` / `head_nod` / `head_dance` | – | arm | gestures |
//! | `move_to_coords` | float, float | arm | workspace ±300 mm |
//! | `single_joint_move` | int, float | arm | joints 1–6, ±170° |
//! | `move_to_top_view` | – | arm | |
//! | `pump_on` | – | gripper | |
//! | `pump_off` | – | gripper | recovery |
//! | `llm_led` | str | indicator | |
//! | `top_view_shot` | – | vision | observes the scene |
//! | `vlm_vqa` | str | vision | answers with auxiliary text |
//!
//! The arm, pump and LED journal their safe state as `safe_state(<id>)`.
//!
//! # Example
//!
//! ```rust
//! use embodia_hal::sim::SimRigBuilder;
//!
//! let (mut registry, journal) = SimRigBuilder::new().with_arm().with_pump().build();
//! registry.invoke("move_to_zero", &[]).unwrap();
//! assert_eq!(journal.calls(), vec!["move_to_zero()"]);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use embodia_types::{ActionCall, ActionSignature, ArgKind, ArgValue, Subsystem, VisualObject};

use crate::actuator::{Actuation, Actuator, ActuatorError};
use crate::registry::ActuatorRegistry;

const WORKSPACE_LIMIT_MM: f64 = 300.0;
const JOINT_LIMIT_DEG: f64 = 170.0;

/// Fault key that targets every device's safe-state command.
pub const SAFE_STATE: &str = "safe_state";

/// Fault injected into a simulated action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    /// Recoverable driver fault.
    Fault,
    /// The device did not finish in time.
    Timeout,
    /// The control link is lost (safety-critical).
    LinkLost,
    /// The driver panics mid-call.
    Panic,
}

/// Shared, append-only log of simulated invocations.
#[derive(Debug, Clone, Default)]
pub struct SimJournal(Arc<Mutex<Vec<String>>>);

impl SimJournal {
    fn record(&self, entry: String) {
        if let Ok(mut log) = self.0.lock() {
            log.push(entry);
        }
    }

    /// Snapshot of everything recorded so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

#[derive(Clone)]
struct SimContext {
    journal: SimJournal,
    faults: Arc<HashMap<String, SimFault>>,
}

impl SimContext {
    /// Record the attempt, then apply any injected fault.
    fn attempt(&self, component: &str, action: &str, args: &[ArgValue]) -> Result<(), ActuatorError> {
        self.journal
            .record(ActionCall::new(action, args.to_vec()).to_string());
        self.inject(component, action)
    }

    /// Record a safe-state command as `safe_state(<component>)`.
    fn park(&self, component: &str) -> Result<(), ActuatorError> {
        self.journal.record(format!("{SAFE_STATE}({component})"));
        self.inject(component, SAFE_STATE)
    }

    fn inject(&self, component: &str, action: &str) -> Result<(), ActuatorError> {
        match self.faults.get(action) {
            None => Ok(()),
            Some(SimFault::Fault) => Err(ActuatorError::Fault {
                component: component.to_string(),
                details: format!("injected fault in {action}"),
            }),
            Some(SimFault::Timeout) => Err(ActuatorError::Timeout {
                component: component.to_string(),
                action: action.to_string(),
            }),
            Some(SimFault::LinkLost) => Err(ActuatorError::LinkLost {
                component: component.to_string(),
                details: "simulated serial link drop".to_string(),
            }),
            Some(SimFault::Panic) => panic!("simulated driver panic in {action}"),
        }
    }
}

fn float_arg(action: &str, args: &[ArgValue], i: usize) -> Result<f64, ActuatorError> {
    args.get(i)
        .and_then(ArgValue::as_f64)
        .ok_or_else(|| ActuatorError::BadArgument {
            action: action.to_string(),
            details: format!("argument {i} must be a number"),
        })
}

// ────────────────────────────────────────────────────────────────────────────
// Arm
// ────────────────────────────────────────────────────────────────────────────

struct SimArm {
    ctx: SimContext,
    joints_deg: [f64; 6],
    tool_xy_mm: Option<(f64, f64)>,
}

impl Actuator for SimArm {
    fn id(&self) -> &str {
        "arm"
    }

    fn actions(&self) -> Vec<ActionSignature> {
        let arm = |name: &str, params: Vec<ArgKind>| ActionSignature::new(name, params, Subsystem::Arm);
        vec![
            arm("move_to_zero", vec![]).recovery(),
            arm("relax_arms", vec![]),
            arm("head_shake", vec![]),
            arm("head_nod", vec![]),
            arm("head_dance", vec![]),
            arm("move_to_coords", vec![ArgKind::Float, ArgKind::Float]),
            arm("single_joint_move", vec![ArgKind::Int, ArgKind::Float]),
            arm("move_to_top_view", vec![]),
        ]
    }

    fn invoke(&mut self, action: &str, args: &[ArgValue]) -> Result<Actuation, ActuatorError> {
        self.ctx.attempt("arm", action, args)?;
        match action {
            "move_to_zero" => {
                self.joints_deg = [0.0; 6];
                self.tool_xy_mm = None;
            }
            "relax_arms" | "head_shake" | "head_nod" | "head_dance" | "move_to_top_view" => {}
            "move_to_coords" => {
                let x = float_arg(action, args, 0)?;
                let y = float_arg(action, args, 1)?;
                if x.abs() > WORKSPACE_LIMIT_MM || y.abs() > WORKSPACE_LIMIT_MM {
                    return Err(ActuatorError::BadArgument {
                        action: action.to_string(),
                        details: format!("({x}, {y}) is outside the ±{WORKSPACE_LIMIT_MM} mm workspace"),
                    });
                }
                self.tool_xy_mm = Some((x, y));
            }
            "single_joint_move" => {
                let joint = args.first().and_then(ArgValue::as_i64).unwrap_or(0);
                let angle = float_arg(action, args, 1)?;
                if !(1..=6).contains(&joint) || angle.abs() > JOINT_LIMIT_DEG {
                    return Err(ActuatorError::BadArgument {
                        action: action.to_string(),
                        details: format!("joint {joint} to {angle}° is out of range"),
                    });
                }
                self.joints_deg[(joint - 1) as usize] = angle;
            }
            other => return Err(ActuatorError::NotRegistered(other.to_string())),
        }
        debug!(joints = ?self.joints_deg, tool = ?self.tool_xy_mm, "sim arm pose");
        Ok(Actuation::none())
    }

    fn safe_state(&mut self) -> Result<(), ActuatorError> {
        self.ctx.park("arm")?;
        self.joints_deg = [0.0; 6];
        self.tool_xy_mm = None;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pump
// ────────────────────────────────────────────────────────────────────────────

struct SimPump {
    ctx: SimContext,
    on: bool,
}

impl Actuator for SimPump {
    fn id(&self) -> &str {
        "pump"
    }

    fn actions(&self) -> Vec<ActionSignature> {
        vec![
            ActionSignature::new("pump_on", vec![], Subsystem::Gripper),
            ActionSignature::new("pump_off", vec![], Subsystem::Gripper).recovery(),
        ]
    }

    fn invoke(&mut self, action: &str, args: &[ArgValue]) -> Result<Actuation, ActuatorError> {
        self.ctx.attempt("pump", action, args)?;
        self.on = action == "pump_on";
        debug!(on = self.on, "sim pump");
        Ok(Actuation::none())
    }

    fn safe_state(&mut self) -> Result<(), ActuatorError> {
        self.ctx.park("pump")?;
        self.on = false;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LED
// ────────────────────────────────────────────────────────────────────────────

struct SimLed {
    ctx: SimContext,
    color: Option<String>,
}

impl Actuator for SimLed {
    fn id(&self) -> &str {
        "led"
    }

    fn actions(&self) -> Vec<ActionSignature> {
        vec![ActionSignature::new(
            "llm_led",
            vec![ArgKind::Str],
            Subsystem::Indicator,
        )]
    }

    fn invoke(&mut self, action: &str, args: &[ArgValue]) -> Result<Actuation, ActuatorError> {
        self.ctx.attempt("led", action, args)?;
        self.color = args.first().and_then(ArgValue::as_str).map(str::to_string);
        debug!(color = ?self.color, "sim led");
        Ok(Actuation::none())
    }

    fn safe_state(&mut self) -> Result<(), ActuatorError> {
        self.ctx.park("led")?;
        self.color = None;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Camera
// ────────────────────────────────────────────────────────────────────────────

struct SimCamera {
    ctx: SimContext,
    scene: Vec<VisualObject>,
}

impl Actuator for SimCamera {
    fn id(&self) -> &str {
        "camera"
    }

    fn actions(&self) -> Vec<ActionSignature> {
        vec![
            ActionSignature::new("top_view_shot", vec![], Subsystem::Vision),
            ActionSignature::new("vlm_vqa", vec![ArgKind::Str], Subsystem::Vision),
        ]
    }

    fn invoke(&mut self, action: &str, args: &[ArgValue]) -> Result<Actuation, ActuatorError> {
        self.ctx.attempt("camera", action, args)?;
        match action {
            "top_view_shot" => Ok(Actuation::observed(self.scene.clone())),
            "vlm_vqa" => {
                let labels: Vec<&str> = self.scene.iter().map(|o| o.label.as_str()).collect();
                if labels.is_empty() {
                    Ok(Actuation::say("I do not see anything on the table"))
                } else {
                    Ok(Actuation::say(format!("I can see {}", labels.join(", "))))
                }
            }
            other => Err(ActuatorError::NotRegistered(other.to_string())),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Assembles a simulated robot into an [`ActuatorRegistry`].
#[derive(Default)]
pub struct SimRigBuilder {
    arm: bool,
    pump: bool,
    led: bool,
    scene: Option<Vec<VisualObject>>,
    faults: HashMap<String, SimFault>,
}

impl SimRigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm, pump, LED and a camera watching `scene`.
    pub fn full(scene: Vec<VisualObject>) -> Self {
        Self::new().with_arm().with_pump().with_led().with_camera(scene)
    }

    pub fn with_arm(mut self) -> Self {
        self.arm = true;
        self
    }

    pub fn with_pump(mut self) -> Self {
        self.pump = true;
        self
    }

    pub fn with_led(mut self) -> Self {
        self.led = true;
        self
    }

    pub fn with_camera(mut self, scene: Vec<VisualObject>) -> Self {
        self.scene = Some(scene);
        self
    }

    /// Make every invocation of `action` fail with `fault`.
    ///
    /// [`SAFE_STATE`] targets the safe-state command of the arm, pump and
    /// LED.
    pub fn with_fault(mut self, action: impl Into<String>, fault: SimFault) -> Self {
        self.faults.insert(action.into(), fault);
        self
    }

    pub fn build(self) -> (ActuatorRegistry, SimJournal) {
        let journal = SimJournal::default();
        let ctx = SimContext {
            journal: journal.clone(),
            faults: Arc::new(self.faults),
        };
        let mut registry = ActuatorRegistry::new();
        if self.arm {
            registry.register(Box::new(SimArm {
                ctx: ctx.clone(),
                joints_deg: [0.0; 6],
                tool_xy_mm: None,
            }));
        }
        if self.pump {
            registry.register(Box::new(SimPump {
                ctx: ctx.clone(),
                on: false,
            }));
        }
        if self.led {
            registry.register(Box::new(SimLed {
                ctx: ctx.clone(),
                color: None,
            }));
        }
        if let Some(scene) = self.scene {
            registry.register(Box::new(SimCamera { ctx, scene }));
        }
        (registry, journal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Vec<VisualObject> {
        vec![
            VisualObject::new("green block").at(210, 140),
            VisualObject::new("basketball").at(80, 95),
        ]
    }

    #[test]
    fn full_rig_exposes_whole_vocabulary() {
        let (registry, _) = SimRigBuilder::full(scene()).build();
        for name in [
            "move_to_zero",
            "head_shake",
            "move_to_coords",
            "single_joint_move",
            "pump_on",
            "pump_off",
            "llm_led",
            "top_view_shot",
            "vlm_vqa",
        ] {
            assert!(registry.contains(name), "{name} missing");
        }
        assert!(registry.signature("move_to_zero").unwrap().recovery);
        assert_eq!(
            registry.signature("move_to_coords").unwrap().params,
            vec![ArgKind::Float, ArgKind::Float]
        );
    }

    #[test]
    fn journal_records_calls_in_order() {
        let (mut registry, journal) = SimRigBuilder::full(scene()).build();
        registry.invoke("move_to_zero", &[]).unwrap();
        registry
            .invoke("move_to_coords", &[ArgValue::Int(120), ArgValue::Float(-40.5)])
            .unwrap();
        registry.invoke("pump_on", &[]).unwrap();
        assert_eq!(
            journal.calls(),
            vec!["move_to_zero()", "move_to_coords(120, -40.5)", "pump_on()"]
        );
    }

    #[test]
    fn move_outside_workspace_is_rejected() {
        let (mut registry, _) = SimRigBuilder::new().with_arm().build();
        let result = registry.invoke("move_to_coords", &[ArgValue::Int(500), ArgValue::Int(0)]);
        assert!(matches!(result, Err(ActuatorError::BadArgument { .. })));
    }

    #[test]
    fn camera_observes_scene_and_answers_questions() {
        let (mut registry, _) = SimRigBuilder::full(scene()).build();
        let shot = registry.invoke("top_view_shot", &[]).unwrap();
        assert_eq!(shot.observation.unwrap().len(), 2);

        let answer = registry
            .invoke("vlm_vqa", &[ArgValue::Str("what is there?".into())])
            .unwrap();
        assert_eq!(
            answer.auxiliary.as_deref(),
            Some("I can see green block, basketball")
        );
    }

    #[test]
    fn injected_faults_surface_as_driver_errors() {
        let (mut registry, journal) = SimRigBuilder::full(scene())
            .with_fault("pump_on", SimFault::Timeout)
            .with_fault("head_nod", SimFault::LinkLost)
            .build();
        assert!(matches!(
            registry.invoke("pump_on", &[]),
            Err(ActuatorError::Timeout { .. })
        ));
        let lost = registry.invoke("head_nod", &[]).unwrap_err();
        assert!(lost.is_safety_critical());
        // Attempts are journaled even when they fail.
        assert_eq!(journal.calls(), vec!["pump_on()", "head_nod()"]);
    }

    #[test]
    fn safe_state_returns_arm_to_zero_and_stops_pump() {
        let (mut registry, journal) = SimRigBuilder::new().with_arm().with_pump().build();
        registry.command_safe_state().unwrap();
        assert_eq!(journal.calls(), vec!["safe_state(arm)", "safe_state(pump)"]);
    }

    #[test]
    fn led_safe_state_is_journaled() {
        let (mut registry, journal) = SimRigBuilder::full(scene()).build();
        registry
            .invoke("llm_led", &[ArgValue::Str("blue".into())])
            .unwrap();
        registry.command_safe_state().unwrap();
        assert_eq!(
            journal.calls(),
            vec![
                "llm_led(\"blue\")",
                "safe_state(arm)",
                "safe_state(led)",
                "safe_state(pump)",
            ]
        );
    }

    #[test]
    fn safe_state_faults_can_be_injected() {
        let (mut registry, journal) = SimRigBuilder::new()
            .with_pump()
            .with_fault(SAFE_STATE, SimFault::Fault)
            .build();
        assert!(matches!(
            registry.command_safe_state(),
            Err(ActuatorError::Fault { .. })
        ));
        assert_eq!(journal.calls(), vec!["safe_state(pump)"]);
    }
}
