//! Outcome signals: the control vocabulary actions speak to the run loop
//!
//! An action returns `None` to let the pipeline continue, or a terminal
//! [`Signal`] that stops the pipeline and tells the run loop what to do next.
//! The engine holds no persistent state machine table; the pipeline is the
//! state machine, re-walked from the top on every reconcile.

use std::time::Duration;

use kube::runtime::controller::Action as ReconcileAction;
use tracing::{error, info};

use nimbus_common::Error;

/// Terminal outcome of a pipeline run
#[derive(Debug)]
pub enum Signal {
    /// Stop; no requeue. Further progress requires an external event.
    StopAndForget,
    /// Stop; schedule another reconcile immediately. Used after a mutation
    /// that should be observed fresh, or after a transient error.
    StopWithRequeue,
    /// Stop; schedule another reconcile after the delay. Used while polling a
    /// long-running external operation.
    RequeueAfter(Duration),
    /// Stop; logged and not retried automatically.
    Fatal(Error),
}

impl Signal {
    /// Convenience constructor for second-granularity requeues
    pub fn requeue_after_secs(secs: u64) -> Self {
        Self::RequeueAfter(Duration::from_secs(secs))
    }
}

/// Continue-or-stop result of a single action; `None` means continue
pub type Flow = Option<Signal>;

/// Translate a finished pipeline's flow into a scheduling decision
///
/// Fatal signals surface as `Err` so the controller's error policy logs them.
/// The error policy must not requeue; only a fresh watch event re-triggers
/// the resource.
pub fn handle(flow: Flow) -> Result<ReconcileAction, Error> {
    match flow {
        None => {
            info!("reconciliation finished without control signal, stop and forget");
            Ok(ReconcileAction::await_change())
        }
        Some(Signal::StopAndForget) => {
            info!("reconciliation finished with stop and forget");
            Ok(ReconcileAction::await_change())
        }
        Some(Signal::StopWithRequeue) => {
            info!("reconciliation finished with requeue");
            Ok(ReconcileAction::requeue(Duration::ZERO))
        }
        Some(Signal::RequeueAfter(delay)) => {
            info!(delay = ?delay, "reconciliation finished with delayed requeue");
            Ok(ReconcileAction::requeue(delay))
        }
        Some(Signal::Fatal(err)) => {
            error!(error = %err, "reconciliation finished with fatal error");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continue_and_stop_and_forget_await_change() {
        assert_eq!(handle(None).unwrap(), ReconcileAction::await_change());
        assert_eq!(
            handle(Some(Signal::StopAndForget)).unwrap(),
            ReconcileAction::await_change()
        );
    }

    #[test]
    fn requeue_signals_map_to_requeues() {
        assert_eq!(
            handle(Some(Signal::StopWithRequeue)).unwrap(),
            ReconcileAction::requeue(Duration::ZERO)
        );
        assert_eq!(
            handle(Some(Signal::requeue_after_secs(10))).unwrap(),
            ReconcileAction::requeue(Duration::from_secs(10))
        );
    }

    #[test]
    fn fatal_surfaces_as_error() {
        let res = handle(Some(Signal::Fatal(Error::internal("test", "boom"))));
        assert!(res.is_err());
    }
}
