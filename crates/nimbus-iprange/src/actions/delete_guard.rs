//! Deletion guards

use async_trait::async_trait;
use tracing::info;

use nimbus_common::crd::reasons;
use nimbus_common::crd::types::{condition_types, Condition, StatusState};
use nimbus_common::KCP_FINALIZER;
use nimbus_pipeline::{Action, Flow, Signal, StatusPatch};

use crate::actions::{retry, BUSY_DELAY};
use crate::state::IpRangeState;

/// Stops deletion handling when we never added our finalizer
pub struct RequireFinalizer;

#[async_trait]
impl Action<IpRangeState> for RequireFinalizer {
    fn name(&self) -> &str {
        "requireFinalizer"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        if state.has_finalizer(KCP_FINALIZER) {
            None
        } else {
            Some(Signal::StopAndForget)
        }
    }
}

/// Blocks teardown while other resources still place endpoints in the range
///
/// Sets a Warning condition naming the users and re-checks after a short
/// delay; once the last user is gone the warning is dropped and teardown
/// proceeds.
pub struct PreventDeleteWhileUsed;

#[async_trait]
impl Action<IpRangeState> for PreventDeleteWhileUsed {
    fn name(&self) -> &str {
        "preventDeleteWhileUsed"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let namespace = state.key().namespace.clone();
        let name = state.name();
        let users = match state.usage.users_of(&namespace, &name).await {
            Ok(users) => users,
            Err(err) => return retry(err, "list range users"),
        };
        if users.is_empty() {
            return StatusPatch::new()
                .remove_conditions(condition_types::WARNING)
                .continue_flow()
                .error_log("failed to drop delete warning")
                .run(state)
                .await;
        }
        info!(users = ?users, "deletion blocked, range still in use");
        StatusPatch::new()
            .state(StatusState::Warning)
            .set_condition(Condition::warning(
                reasons::DELETE_WHILE_USED,
                format!("Can not be deleted while used by: [{}]", users.join(", ")),
            ))
            .requeue_after(BUSY_DELAY)
            .error_log("failed to record delete warning")
            .run(state)
            .await
    }
}

/// Marks the range as Deleting before provider teardown starts
pub struct MarkDeleting;

#[async_trait]
impl Action<IpRangeState> for MarkDeleting {
    fn name(&self) -> &str {
        "markDeleting"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        StatusPatch::new()
            .state(StatusState::Deleting)
            .continue_flow()
            .error_log("failed to mark deleting")
            .run(state)
            .await
    }
}
