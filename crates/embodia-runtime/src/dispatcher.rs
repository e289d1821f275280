//! [`Dispatcher`] – ordered, fault-isolated plan execution.
//!
//! The [`ActuatorRegistry`] lives on one dedicated OS thread,
//! `actuator-worker`, so blocking drivers never stall the async runtime.  A
//! whole plan is submitted as one job and always runs to completion; no
//! timeout is applied to it.
//!
//! Within a plan ([`execute_plan`]):
//!
//! - calls run strictly in order and the plan is never mutated;
//! - a driver error or panic fails only its own action;
//! - later actions on a subsystem blocked by an earlier failure are skipped
//!   with [`ErrorKind::DependencyAborted`], per the [`DependencyPolicy`];
//! - recovery actions always run, and clear their subsystem's fault on
//!   success;
//! - a safety-critical fault halts the plan: every remaining action is
//!   recorded as [`ErrorKind::Halted`].

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;

use embodia_hal::ActuatorRegistry;
use embodia_kernel::{DependencyPolicy, ValidatedPlan};
use embodia_types::{ActionResult, ActionSignature, AgentError, ErrorKind};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Everything one plan produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    /// One result per planned call, in plan order.
    pub results: Vec<ActionResult>,
    /// Set when a safety-critical fault halted the plan.
    pub safety_fault: Option<AgentError>,
}

impl DispatchReport {
    /// Auxiliary outputs of successful actions, in plan order.
    pub fn auxiliary(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|r| r.output.clone())
            .collect()
    }
}

/// Run `plan` against `registry`.  Blocking; call it from the worker thread.
pub fn execute_plan(
    registry: &mut ActuatorRegistry,
    policy: &DependencyPolicy,
    plan: &ValidatedPlan,
) -> DispatchReport {
    let mut ledger = policy.ledger();
    let mut results = Vec::with_capacity(plan.len());
    let mut safety_fault = None;

    for (index, step) in plan.calls().iter().enumerate() {
        let call = step.call().clone();

        if safety_fault.is_some() {
            results.push(ActionResult::failure(index, call, ErrorKind::Halted));
            continue;
        }

        if !step.is_recovery() {
            if let Some((subsystem, failed)) = ledger.blocker(step.subsystem()) {
                let error = ErrorKind::DependencyAborted {
                    subsystem,
                    failed_action: failed.to_string(),
                };
                warn!(index, action = %call.name, %error, "action skipped");
                results.push(ActionResult::failure(index, call, error));
                continue;
            }
        }

        debug!(index, %call, "invoking action");
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            registry.invoke(&call.name, &call.arguments)
        }));

        let result = match outcome {
            Ok(Ok(actuation)) => {
                if step.is_recovery() {
                    ledger.clear(step.subsystem());
                }
                ActionResult::success(index, call, actuation.auxiliary, actuation.observation)
            }
            Ok(Err(e)) if e.is_safety_critical() => {
                error!(index, action = %call.name, error = %e, "safety-critical actuator fault");
                safety_fault = Some(AgentError::SafetyCritical {
                    action: call.name.clone(),
                    details: e.to_string(),
                });
                ActionResult::failure(index, call, ErrorKind::SafetyCritical(e.to_string()))
            }
            Ok(Err(e)) => {
                warn!(index, action = %call.name, error = %e, "action failed");
                ledger.record_failure(step.subsystem(), &call.name);
                ActionResult::failure(index, call, ErrorKind::ActuatorFault(e.to_string()))
            }
            Err(payload) => {
                let details = format!("driver panicked: {}", panic_message(payload.as_ref()));
                warn!(index, action = %call.name, %details, "action failed");
                ledger.record_failure(step.subsystem(), &call.name);
                ActionResult::failure(index, call, ErrorKind::ActuatorFault(details))
            }
        };
        results.push(result);
    }

    DispatchReport {
        results,
        safety_fault,
    }
}

/// Command the safe state, treating a driver panic as a failure so the
/// worker survives it.
fn park(registry: &mut ActuatorRegistry) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(|| registry.command_safe_state())) {
        Ok(outcome) => outcome.map_err(|e| e.to_string()),
        Err(payload) => {
            let details = format!("driver panicked: {}", panic_message(payload.as_ref()));
            error!(%details, "safe state command panicked");
            Err(details)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker thread
// ─────────────────────────────────────────────────────────────────────────────

enum Job {
    Dispatch {
        plan: ValidatedPlan,
        reply: oneshot::Sender<DispatchReport>,
    },
    SafeState {
        reply: oneshot::Sender<Result<(), String>>,
    },
}

/// Async handle onto the `actuator-worker` thread.
pub struct Dispatcher {
    jobs: Option<mpsc::UnboundedSender<Job>>,
    worker: Option<JoinHandle<()>>,
    catalog: Vec<ActionSignature>,
}

impl Dispatcher {
    /// Move `registry` onto a new `actuator-worker` thread.
    pub fn spawn(registry: ActuatorRegistry, policy: DependencyPolicy) -> Result<Self, AgentError> {
        let catalog = registry.catalog();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let worker = std::thread::Builder::new()
            .name("actuator-worker".into())
            .spawn(move || {
                let mut registry = registry;
                while let Some(job) = rx.blocking_recv() {
                    match job {
                        Job::Dispatch { plan, reply } => {
                            let report = execute_plan(&mut registry, &policy, &plan);
                            let _ = reply.send(report);
                        }
                        Job::SafeState { reply } => {
                            let _ = reply.send(park(&mut registry));
                        }
                    }
                }
                debug!("actuator worker stopped");
            })
            .map_err(|e| AgentError::Channel(format!("cannot start actuator worker: {e}")))?;
        info!(actions = catalog.len(), "actuator worker started");
        Ok(Self {
            jobs: Some(tx),
            worker: Some(worker),
            catalog,
        })
    }

    /// Every action the worker's registry can run.
    pub fn catalog(&self) -> &[ActionSignature] {
        &self.catalog
    }

    /// Execute `plan` to completion.
    pub async fn dispatch(&self, plan: ValidatedPlan) -> Result<DispatchReport, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Job::Dispatch { plan, reply })?;
        rx.await.map_err(|_| worker_gone())
    }

    /// Put every actuator into its documented safe state.
    ///
    /// A failure or driver panic here, or a worker that is no longer
    /// running, is reported as [`AgentError::SafetyCritical`].
    pub async fn command_safe_state(&self) -> Result<(), AgentError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Job::SafeState { reply })?;
        rx.await
            .map_err(|_| worker_gone())?
            .map_err(|details| AgentError::SafetyCritical {
                action: "safe_state".into(),
                details,
            })
    }

    fn submit(&self, job: Job) -> Result<(), AgentError> {
        self.jobs
            .as_ref()
            .ok_or_else(worker_gone)?
            .send(job)
            .map_err(|_| worker_gone())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the queue ends the worker loop.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("actuator worker panicked");
            }
        }
    }
}

/// Without the worker nothing can reach the actuators, not even the safe
/// state, so this is fatal.
fn worker_gone() -> AgentError {
    AgentError::SafetyCritical {
        action: "actuator-worker".into(),
        details: "actuator worker is not running".into(),
    }
}
