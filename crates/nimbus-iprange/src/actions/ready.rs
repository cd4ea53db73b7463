//! Terminal Ready status

use async_trait::async_trait;

use nimbus_common::crd::types::{Condition, StatusState};
use nimbus_pipeline::{Action, Flow, StatusPatch};

use crate::state::IpRangeState;

/// Marks the range Ready with an exclusive Ready condition
///
/// Idempotent by way of the patch builder: an already-Ready range produces no
/// write. Terminal either way.
pub struct StatusReady;

#[async_trait]
impl Action<IpRangeState> for StatusReady {
    fn name(&self) -> &str {
        "statusReady"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        StatusPatch::new()
            .state(StatusState::Ready)
            .set_exclusive_conditions(vec![Condition::ready()])
            .success_log("iprange is ready")
            .error_log("failed to mark ready")
            .run(state)
            .await
    }
}
