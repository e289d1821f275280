//! `embodia-types` – shared data model for the perception-to-action loop.
//!
//! Every crate in the workspace speaks in these types: perception events and
//! snapshots on the way in, typed [`ActionPlan`]s in the middle, and
//! [`ActionResult`]s on the way out.  [`AgentError`] is the single error
//! taxonomy a round can fail with.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Perception
// ─────────────────────────────────────────────────────────────────────────────

/// One object reported by the external object detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualObject {
    /// Detector label, e.g. `"green block"`.
    pub label: String,
    /// Object centre in camera pixel coordinates, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_px: Option<[i32; 2]>,
    /// Detector confidence in `[0, 1]`, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl VisualObject {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            center_px: None,
            confidence: None,
        }
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.center_px = Some([x, y]);
        self
    }
}

/// A recognised utterance pushed by the speech producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub arrived_at: DateTime<Utc>,
}

/// A structured visual summary pushed by the vision producer or the feedback
/// channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionEvent {
    pub objects: Vec<VisualObject>,
    pub arrived_at: DateTime<Utc>,
    /// Set for observations routed back from executed actions.  These refresh
    /// the world state but are not a stimulus on their own.
    #[serde(default)]
    pub from_feedback: bool,
}

/// The aligned view of both modalities for one round.
///
/// Either field may be empty; a snapshot with neither signals "no new
/// stimulus".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionSnapshot {
    pub id: Uuid,
    pub transcript: Option<String>,
    pub visual_summary: Option<Vec<VisualObject>>,
    pub timestamp: DateTime<Utc>,
}

impl PerceptionSnapshot {
    pub fn new(transcript: Option<String>, visual_summary: Option<Vec<VisualObject>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            transcript,
            visual_summary,
            timestamp: Utc::now(),
        }
    }

    /// `true` when neither modality carries usable data.
    pub fn is_empty(&self) -> bool {
        let no_text = self
            .transcript
            .as_deref()
            .is_none_or(|t| t.trim().is_empty());
        let no_vision = self.visual_summary.as_ref().is_none_or(Vec::is_empty);
        no_text && no_vision
    }
}

/// Reasoning-ready form of one [`PerceptionSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusedContext {
    /// Trimmed transcript, or empty when no speech was captured.
    pub textual_representation: String,
    /// One-line scene description, or empty when no objects were seen.
    pub visual_representation: String,
    pub source_snapshot: Uuid,
}

impl FusedContext {
    /// Render the context as the content of a user-role turn.
    pub fn render(&self) -> String {
        match (
            self.textual_representation.is_empty(),
            self.visual_representation.is_empty(),
        ) {
            (false, false) => format!(
                "{}\n[scene] {}",
                self.textual_representation, self.visual_representation
            ),
            (false, true) => self.textual_representation.clone(),
            (true, false) => format!("[scene] {}", self.visual_representation),
            (true, true) => String::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────────────────────────────────────

/// The role of a participant in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single turn of the running conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plans
// ─────────────────────────────────────────────────────────────────────────────

/// A literal argument of an [`ActionCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ArgValue {
    pub fn kind(&self) -> ArgKind {
        match self {
            ArgValue::Bool(_) => ArgKind::Bool,
            ArgValue::Int(_) => ArgKind::Int,
            ArgValue::Float(_) => ArgKind::Float,
            ArgValue::Str(_) => ArgKind::Str,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArgValue::Int(v) => Some(*v as f64),
            ArgValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(b) => write!(f, "{b}"),
            ArgValue::Int(i) => write!(f, "{i}"),
            ArgValue::Float(x) if x.fract() == 0.0 && x.is_finite() => write!(f, "{x:.1}"),
            ArgValue::Float(x) => write!(f, "{x}"),
            ArgValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Declared type of an action parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    Int,
    Float,
    Str,
    Bool,
}

impl ArgKind {
    /// `true` when `value` may be bound to a parameter of this kind.
    /// Integer literals are accepted for float parameters.
    pub fn accepts(self, value: &ArgValue) -> bool {
        matches!(
            (self, value),
            (ArgKind::Int, ArgValue::Int(_))
                | (ArgKind::Float, ArgValue::Float(_) | ArgValue::Int(_))
                | (ArgKind::Str, ArgValue::Str(_))
                | (ArgKind::Bool, ArgValue::Bool(_))
        )
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArgKind::Int => "int",
            ArgKind::Float => "float",
            ArgKind::Str => "str",
            ArgKind::Bool => "bool",
        };
        f.write_str(s)
    }
}

/// Physical subsystem an action belongs to.  Dependency aborts are decided
/// per subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    /// Arm joints and end-effector pose.
    Arm,
    /// Suction pump / gripper.
    Gripper,
    /// Status LEDs.
    Indicator,
    /// Camera and vision-language queries.
    Vision,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Subsystem::Arm => "arm",
            Subsystem::Gripper => "gripper",
            Subsystem::Indicator => "indicator",
            Subsystem::Vision => "vision",
        };
        f.write_str(s)
    }
}

/// Declared signature of a registered action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSignature {
    pub name: String,
    pub params: Vec<ArgKind>,
    pub subsystem: Subsystem,
    /// Recovery actions (e.g. return to zero) are never dependency-aborted.
    pub recovery: bool,
}

impl ActionSignature {
    pub fn new(name: impl Into<String>, params: Vec<ArgKind>, subsystem: Subsystem) -> Self {
        Self {
            name: name.into(),
            params,
            subsystem,
            recovery: false,
        }
    }

    pub fn recovery(mut self) -> Self {
        self.recovery = true;
        self
    }
}

impl fmt::Display for ActionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        write!(f, "{}({})", self.name, params.join(", "))
    }
}

/// One typed actuator invocation requested by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<ArgValue>,
}

impl ActionCall {
    pub fn new(name: impl Into<String>, arguments: Vec<ArgValue>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

impl fmt::Display for ActionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.arguments.iter().map(ToString::to_string).collect();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}

/// The planner's structured output: a spoken reply plus ordered actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub response: String,
    pub actions: Vec<ActionCall>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution results
// ─────────────────────────────────────────────────────────────────────────────

/// Why a single action did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ErrorKind {
    #[error("actuator fault: {0}")]
    ActuatorFault(String),

    #[error("skipped: {subsystem} subsystem failed earlier at {failed_action}")]
    DependencyAborted {
        subsystem: Subsystem,
        failed_action: String,
    },

    #[error("safety-critical fault: {0}")]
    SafetyCritical(String),

    #[error("skipped: session halting after a safety-critical fault")]
    Halted,
}

/// Outcome of one dispatched [`ActionCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Position of the call in its plan.
    pub index: usize,
    pub call: ActionCall,
    pub succeeded: bool,
    /// Auxiliary string produced by the actuator.
    pub output: Option<String>,
    pub error: Option<ErrorKind>,
    /// Refreshed visual state observed after the action, if any.
    pub observation: Option<Vec<VisualObject>>,
}

impl ActionResult {
    pub fn success(
        index: usize,
        call: ActionCall,
        output: Option<String>,
        observation: Option<Vec<VisualObject>>,
    ) -> Self {
        Self {
            index,
            call,
            succeeded: true,
            output,
            error: None,
            observation,
        }
    }

    pub fn failure(index: usize, call: ActionCall, error: ErrorKind) -> Self {
        Self {
            index,
            call,
            succeeded: false,
            output: None,
            error: Some(error),
            observation: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error taxonomy
// ─────────────────────────────────────────────────────────────────────────────

/// Every way a round can fail.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentError {
    #[error("no transcript or visual data in this round")]
    EmptyInput,

    #[error("reasoning backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("reasoning backend did not answer within {timeout_ms} ms")]
    BackendTimeout { timeout_ms: u64 },

    #[error("malformed plan: {0}")]
    MalformedPlan(String),

    #[error("action #{index} '{name}' is not a registered action")]
    UnknownAction { index: usize, name: String },

    #[error("action #{index} '{name}': expected ({expected}), got ({found})")]
    ArgumentMismatch {
        index: usize,
        name: String,
        expected: String,
        found: String,
    },

    #[error("safety-critical fault in '{action}': {details}")]
    SafetyCritical { action: String, details: String },

    #[error("perception producers closed")]
    PerceptionClosed,

    #[error("channel error: {0}")]
    Channel(String),
}

impl AgentError {
    /// `true` for errors that must end the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::SafetyCritical { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arg_value_untagged_json() {
        let args: Vec<ArgValue> = serde_json::from_str(r#"[1, 2.5, "red", true]"#).unwrap();
        assert_eq!(
            args,
            vec![
                ArgValue::Int(1),
                ArgValue::Float(2.5),
                ArgValue::Str("red".into()),
                ArgValue::Bool(true),
            ]
        );
    }

    #[test]
    fn float_kind_accepts_integer_literal() {
        assert!(ArgKind::Float.accepts(&ArgValue::Int(3)));
        assert!(!ArgKind::Int.accepts(&ArgValue::Float(3.0)));
        assert!(!ArgKind::Str.accepts(&ArgValue::Bool(false)));
    }

    #[test]
    fn action_call_displays_as_call_expression() {
        let call = ActionCall::new(
            "move_to_coords",
            vec![ArgValue::Int(120), ArgValue::Float(-40.0)],
        );
        assert_eq!(call.to_string(), "move_to_coords(120, -40.0)");

        let call = ActionCall::new("llm_led", vec![ArgValue::Str("blue".into())]);
        assert_eq!(call.to_string(), "llm_led(\"blue\")");
    }

    #[test]
    fn snapshot_emptiness_ignores_blank_transcript_and_empty_scene() {
        assert!(PerceptionSnapshot::new(Some("   ".into()), Some(vec![])).is_empty());
        assert!(!PerceptionSnapshot::new(Some("hi".into()), None).is_empty());
        assert!(!PerceptionSnapshot::new(None, Some(vec![VisualObject::new("cup")])).is_empty());
    }

    #[test]
    fn fused_context_render_omits_missing_modality() {
        let ctx = FusedContext {
            textual_representation: "wave".into(),
            visual_representation: String::new(),
            source_snapshot: Uuid::new_v4(),
        };
        assert_eq!(ctx.render(), "wave");

        let ctx = FusedContext {
            textual_representation: String::new(),
            visual_representation: "cup at (1, 2)".into(),
            source_snapshot: Uuid::new_v4(),
        };
        assert_eq!(ctx.render(), "[scene] cup at (1, 2)");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&ConversationTurn::assistant("ok")).unwrap();
        assert!(json.contains("\"assistant\""));
    }

    #[test]
    fn agent_error_display() {
        let err = AgentError::UnknownAction {
            index: 2,
            name: "fly".into(),
        };
        assert!(err.to_string().contains("'fly'"));
        assert!(AgentError::SafetyCritical {
            action: "move_to_zero".into(),
            details: "arm link lost".into()
        }
        .is_fatal());
        assert!(!AgentError::EmptyInput.is_fatal());
    }
}
