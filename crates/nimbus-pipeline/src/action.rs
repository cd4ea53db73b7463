//! Actions and the pipeline composer
//!
//! An [`Action`] is a function from mutable reconciliation state to a
//! [`Flow`]: `None` to continue, a terminal [`Signal`](crate::Signal) to stop.
//! Actions produce side effects but must be safe to re-invoke; no action may
//! assume any other has or hasn't run.
//!
//! A [`Pipeline`] chains actions under a name and is itself an `Action`, so
//! composition nests transparently and associatively.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::signal::Flow;

/// The atomic unit of reconciliation work
#[async_trait]
pub trait Action<S: Send>: Send + Sync {
    /// Name used in per-step logging
    fn name(&self) -> &str;

    /// Run the action against the state
    async fn run(&self, state: &mut S) -> Flow;
}

/// Shared, type-erased action
pub type DynAction<S> = Arc<dyn Action<S>>;

/// A named, ordered chain of actions
///
/// Runs each step in order until one returns a non-`None` flow, which is then
/// returned to the caller. Composing zero steps is a no-op that continues.
pub struct Pipeline<S: Send> {
    name: String,
    steps: Vec<DynAction<S>>,
}

impl<S: Send + 'static> Pipeline<S> {
    /// Start an empty pipeline with the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn step(mut self, action: impl Action<S> + 'static) -> Self {
        self.steps.push(Arc::new(action));
        self
    }

    /// Append an already shared step
    pub fn step_arc(mut self, action: DynAction<S>) -> Self {
        self.steps.push(action);
        self
    }
}

#[async_trait]
impl<S: Send + 'static> Action<S> for Pipeline<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &mut S) -> Flow {
        for step in &self.steps {
            debug!(pipeline = %self.name, action = %step.name(), "running action");
            if let Some(signal) = step.run(state).await {
                debug!(pipeline = %self.name, action = %step.name(), signal = ?signal, "pipeline stopped");
                return Some(signal);
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::signal::Signal;

    /// Test state recording the order actions ran in
    pub(crate) struct TraceState {
        pub log: Vec<String>,
    }

    impl TraceState {
        pub fn new() -> Self {
            Self { log: Vec::new() }
        }
    }

    /// Action that records its label and returns a fixed flow
    pub(crate) struct TraceAction {
        pub label: &'static str,
        pub flow: fn() -> Flow,
    }

    impl TraceAction {
        pub fn passing(label: &'static str) -> Self {
            Self {
                label,
                flow: || None,
            }
        }

        pub fn stopping(label: &'static str) -> Self {
            Self {
                label,
                flow: || Some(Signal::StopAndForget),
            }
        }
    }

    #[async_trait]
    impl Action<TraceState> for TraceAction {
        fn name(&self) -> &str {
            self.label
        }

        async fn run(&self, state: &mut TraceState) -> Flow {
            state.log.push(self.label.to_string());
            (self.flow)()
        }
    }

    #[tokio::test]
    async fn empty_pipeline_is_a_noop() {
        let mut state = TraceState::new();
        let p = Pipeline::named("empty");
        assert!(p.run(&mut state).await.is_none());
        assert!(state.log.is_empty());
    }

    #[tokio::test]
    async fn all_actions_run_in_sequence() {
        let mut state = TraceState::new();
        let p = Pipeline::named("seq")
            .step(TraceAction::passing("1"))
            .step(TraceAction::passing("2"))
            .step(TraceAction::passing("3"));
        assert!(p.run(&mut state).await.is_none());
        assert_eq!(state.log, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn stops_at_first_signal() {
        let mut state = TraceState::new();
        let p = Pipeline::named("stop")
            .step(TraceAction::passing("1"))
            .step(TraceAction::stopping("2"))
            .step(TraceAction::passing("3"));
        let flow = p.run(&mut state).await;
        assert!(matches!(flow, Some(Signal::StopAndForget)));
        assert_eq!(state.log, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn nested_pipelines_compose_transparently() {
        let mut state = TraceState::new();
        let inner = Pipeline::named("inner")
            .step(TraceAction::passing("2"))
            .step(TraceAction::stopping("3"));
        let outer = Pipeline::named("outer")
            .step(TraceAction::passing("1"))
            .step(inner)
            .step(TraceAction::passing("4"));
        let flow = outer.run(&mut state).await;
        assert!(matches!(flow, Some(Signal::StopAndForget)));
        assert_eq!(state.log, vec!["1", "2", "3"]);
    }
}
