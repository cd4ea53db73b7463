//! Status patch builder with change detection
//!
//! Terminal pipeline steps report outcomes by patching the object's status
//! and stopping with a configured signal. The builder compares the mutated
//! status against the copy last persisted and skips the write when nothing
//! changed, so steady-state reconciles of an already-converged object produce
//! no API traffic. The configured flow is returned either way; suppression
//! applies to the write only, never to control flow.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info};

use nimbus_common::crd::types::{same_conditions, Condition, ObjWithConditions, StatusState};
use nimbus_common::Error;

use crate::signal::{Flow, Signal};
use crate::state::{status_value, ObjState};

enum Outcome {
    StopAndForget,
    StopWithRequeue,
    RequeueAfter(Duration),
    Continue,
}

/// Fluent status mutation, applied and persisted by [`run`](StatusPatch::run)
#[must_use]
pub struct StatusPatch {
    state: Option<StatusState>,
    exclusive_conditions: Option<Vec<Condition>>,
    set_conditions: Vec<Condition>,
    remove_condition_types: Vec<String>,
    success_log: Option<String>,
    error_log: Option<String>,
    outcome: Outcome,
}

impl StatusPatch {
    /// Start a patch; the default outcome is stop-and-forget
    pub fn new() -> Self {
        Self {
            state: None,
            exclusive_conditions: None,
            set_conditions: Vec::new(),
            remove_condition_types: Vec::new(),
            success_log: None,
            error_log: None,
            outcome: Outcome::StopAndForget,
        }
    }

    /// Set the status state
    pub fn state(mut self, state: StatusState) -> Self {
        self.state = Some(state);
        self
    }

    /// Replace the full condition set
    ///
    /// The replacement is skipped when the object already carries conditions
    /// equal up to timestamps, preserving the original transition times.
    pub fn set_exclusive_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.exclusive_conditions = Some(conditions);
        self
    }

    /// Upsert a single condition by type, keeping the rest
    pub fn set_condition(mut self, condition: Condition) -> Self {
        self.set_conditions.push(condition);
        self
    }

    /// Drop all conditions of the given type
    pub fn remove_conditions(mut self, condition_type: impl Into<String>) -> Self {
        self.remove_condition_types.push(condition_type.into());
        self
    }

    /// Log this message at info level after a successful write
    pub fn success_log(mut self, message: impl Into<String>) -> Self {
        self.success_log = Some(message.into());
        self
    }

    /// Log this message alongside the error when the write fails
    pub fn error_log(mut self, message: impl Into<String>) -> Self {
        self.error_log = Some(message.into());
        self
    }

    /// On success, stop without requeue (the default)
    pub fn stop_and_forget(mut self) -> Self {
        self.outcome = Outcome::StopAndForget;
        self
    }

    /// On success, stop and requeue immediately
    pub fn stop_with_requeue(mut self) -> Self {
        self.outcome = Outcome::StopWithRequeue;
        self
    }

    /// On success, stop and requeue after the delay
    pub fn requeue_after(mut self, delay: Duration) -> Self {
        self.outcome = Outcome::RequeueAfter(delay);
        self
    }

    /// On success, let the pipeline continue to the next step
    pub fn continue_flow(mut self) -> Self {
        self.outcome = Outcome::Continue;
        self
    }

    fn success_flow(&self) -> Flow {
        match self.outcome {
            Outcome::StopAndForget => Some(Signal::StopAndForget),
            Outcome::StopWithRequeue => Some(Signal::StopWithRequeue),
            Outcome::RequeueAfter(delay) => Some(Signal::RequeueAfter(delay)),
            Outcome::Continue => None,
        }
    }

    fn apply<O: ObjWithConditions>(&self, obj: &mut O) {
        if let Some(state) = &self.state {
            obj.set_state(state.clone());
        }
        if let Some(desired) = &self.exclusive_conditions {
            if !same_conditions(obj.conditions(), desired) {
                *obj.conditions_mut() = desired.clone();
            }
        }
        for condition in &self.set_conditions {
            let conditions = obj.conditions_mut();
            match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
                Some(existing) => {
                    if existing.status != condition.status
                        || existing.reason != condition.reason
                        || existing.message != condition.message
                    {
                        *existing = condition.clone();
                    }
                }
                None => conditions.push(condition.clone()),
            }
        }
        for type_ in &self.remove_condition_types {
            obj.conditions_mut().retain(|c| &c.type_ != type_);
        }
    }

    /// Apply the mutations and persist the status if it changed
    ///
    /// Returns the configured success flow after a successful or suppressed
    /// write, and an immediate requeue when the write fails.
    pub async fn run<O>(self, state: &mut ObjState<O>) -> Flow
    where
        O: ObjWithConditions + Clone + Serialize + Send + Sync + 'static,
    {
        let persisted = state.persisted().cloned();
        let Some(obj) = state.obj_mut() else {
            return Some(Signal::Fatal(Error::internal(
                "status",
                "status patch on unloaded object",
            )));
        };
        self.apply(obj);

        if let Some(persisted) = &persisted {
            if status_value(obj) == status_value(persisted) {
                debug!("status unchanged, skipping write");
                return self.success_flow();
            }
        }

        let obj = obj.clone();
        match state.ops().patch_status(&obj).await {
            Ok(()) => {
                state.record_persisted();
                if let Some(message) = &self.success_log {
                    info!("{message}");
                }
                self.success_flow()
            }
            Err(err) => {
                match &self.error_log {
                    Some(message) => error!(error = %err, "{message}"),
                    None => error!(error = %err, "failed to patch status"),
                }
                Some(Signal::StopWithRequeue)
            }
        }
    }
}

impl Default for StatusPatch {
    fn default() -> Self {
        Self::new()
    }
}
