//! Context fusion.
//!
//! Converts a [`PerceptionSnapshot`] into the single [`FusedContext`] handed
//! to the planner.  The transformation is pure: the same snapshot always
//! yields the same context, and a missing modality is omitted rather than
//! replaced with placeholder text.
//!
//! # Example
//!
//! ```rust
//! use embodia_perception::fusion::ContextFuser;
//! use embodia_types::{PerceptionSnapshot, VisualObject};
//!
//! let fuser = ContextFuser::default();
//! let snapshot = PerceptionSnapshot::new(
//!     Some("pick up the cup".into()),
//!     Some(vec![VisualObject::new("cup").at(120, 80)]),
//! );
//!
//! let ctx = fuser.fuse(&snapshot).unwrap();
//! assert_eq!(ctx.textual_representation, "pick up the cup");
//! assert_eq!(ctx.visual_representation, "cup at (120, 80)");
//! ```

use embodia_types::{AgentError, FusedContext, PerceptionSnapshot, VisualObject};

/// Default cap on objects described per round.
pub const DEFAULT_MAX_OBJECTS: usize = 16;

/// Builds [`FusedContext`]s from perception snapshots.
#[derive(Debug, Clone)]
pub struct ContextFuser {
    /// Objects beyond this count are summarised as "+N more".
    max_objects: usize,
}

impl Default for ContextFuser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OBJECTS)
    }
}

impl ContextFuser {
    pub fn new(max_objects: usize) -> Self {
        Self {
            max_objects: max_objects.max(1),
        }
    }

    /// Fuse `snapshot` into a reasoning-ready context.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::EmptyInput`] when neither modality carries data.
    pub fn fuse(&self, snapshot: &PerceptionSnapshot) -> Result<FusedContext, AgentError> {
        if snapshot.is_empty() {
            return Err(AgentError::EmptyInput);
        }

        let textual_representation = snapshot
            .transcript
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        let visual_representation = snapshot
            .visual_summary
            .as_deref()
            .map(|objects| self.describe(objects))
            .unwrap_or_default();

        Ok(FusedContext {
            textual_representation,
            visual_representation,
            source_snapshot: snapshot.id,
        })
    }

    fn describe(&self, objects: &[VisualObject]) -> String {
        let mut parts: Vec<String> = objects
            .iter()
            .take(self.max_objects)
            .map(describe_object)
            .collect();
        if objects.len() > self.max_objects {
            parts.push(format!("+{} more", objects.len() - self.max_objects));
        }
        parts.join("; ")
    }
}

fn describe_object(object: &VisualObject) -> String {
    let mut s = object.label.clone();
    if let Some([x, y]) = object.center_px {
        s.push_str(&format!(" at ({x}, {y})"));
    }
    if let Some(c) = object.confidence {
        s.push_str(&format!(" [{c:.2}]"));
    }
    s
}
