//! [`DependencyPolicy`] – which subsystems are blocked once another fails.
//!
//! During one round, a failed action marks its subsystem as faulted.  Every
//! later action whose subsystem is blocked by a faulted subsystem is skipped
//! with [`ErrorKind::DependencyAborted`][embodia_types::ErrorKind].  Recovery
//! actions are exempt and clear their subsystem's fault when they succeed;
//! that bookkeeping lives in [`FaultLedger`].
//!
//! The default policy encodes the physical coupling of a desktop arm:
//!
//! | Failed | Blocks |
//! |--------|--------|
//! | arm | arm, gripper |
//! | gripper | gripper |
//! | indicator | – |
//! | vision | – |

use std::collections::{HashMap, HashSet};

use embodia_types::Subsystem;

/// Explicit per-subsystem dependency edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyPolicy {
    blocks: HashMap<Subsystem, HashSet<Subsystem>>,
}

impl Default for DependencyPolicy {
    fn default() -> Self {
        Self::independent()
            .block(Subsystem::Arm, Subsystem::Arm)
            .block(Subsystem::Arm, Subsystem::Gripper)
            .block(Subsystem::Gripper, Subsystem::Gripper)
    }
}

impl DependencyPolicy {
    /// A policy where no failure ever blocks another action.
    pub fn independent() -> Self {
        Self {
            blocks: HashMap::new(),
        }
    }

    /// Skip `dependent` actions once `failed` has faulted this round.
    pub fn block(mut self, failed: Subsystem, dependent: Subsystem) -> Self {
        self.blocks.entry(failed).or_default().insert(dependent);
        self
    }

    /// Does a fault in `failed` block actions on `dependent`?
    pub fn blocks(&self, failed: Subsystem, dependent: Subsystem) -> bool {
        self.blocks
            .get(&failed)
            .is_some_and(|set| set.contains(&dependent))
    }

    /// Start an empty per-round ledger bound to this policy.
    pub fn ledger(&self) -> FaultLedger<'_> {
        FaultLedger {
            policy: self,
            faulted: Vec::new(),
        }
    }
}

/// Faults recorded so far in one round.
#[derive(Debug)]
pub struct FaultLedger<'a> {
    policy: &'a DependencyPolicy,
    /// `(subsystem, action that failed)` in failure order.
    faulted: Vec<(Subsystem, String)>,
}

impl FaultLedger<'_> {
    /// The first recorded fault that blocks `subsystem`, if any.
    pub fn blocker(&self, subsystem: Subsystem) -> Option<(Subsystem, &str)> {
        self.faulted
            .iter()
            .find(|(failed, _)| self.policy.blocks(*failed, subsystem))
            .map(|(failed, action)| (*failed, action.as_str()))
    }

    pub fn record_failure(&mut self, subsystem: Subsystem, action: &str) {
        if !self.faulted.iter().any(|(s, _)| *s == subsystem) {
            self.faulted.push((subsystem, action.to_string()));
        }
    }

    /// A recovery action on `subsystem` succeeded.
    pub fn clear(&mut self, subsystem: Subsystem) {
        self.faulted.retain(|(s, _)| *s != subsystem);
    }
}
