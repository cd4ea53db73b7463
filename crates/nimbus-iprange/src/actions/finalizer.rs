//! Finalizer handling

use async_trait::async_trait;
use tracing::info;

use nimbus_common::KCP_FINALIZER;
use nimbus_pipeline::{Action, Flow, Signal};

use crate::actions::retry;
use crate::state::IpRangeState;

/// Adds the deletion-hook finalizer on live objects
pub struct AddFinalizer;

#[async_trait]
impl Action<IpRangeState> for AddFinalizer {
    fn name(&self) -> &str {
        "addFinalizer"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        if state.marked_for_deletion() || state.has_finalizer(KCP_FINALIZER) {
            return None;
        }
        let Some(obj) = state.obj() else {
            return Some(Signal::StopAndForget);
        };
        let obj = obj.clone();
        match state.ops().patch_add_finalizer(&obj, KCP_FINALIZER).await {
            Ok(added) => {
                if added {
                    info!("added finalizer");
                    if let Some(obj) = state.obj_mut() {
                        obj.metadata
                            .finalizers
                            .get_or_insert_with(Vec::new)
                            .push(KCP_FINALIZER.to_string());
                    }
                }
                None
            }
            Err(err) => retry(err, "add finalizer"),
        }
    }
}

/// Removes the finalizer once cleanup finished, then stops for good
pub struct RemoveFinalizer;

#[async_trait]
impl Action<IpRangeState> for RemoveFinalizer {
    fn name(&self) -> &str {
        "removeFinalizer"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some(obj) = state.obj() else {
            return Some(Signal::StopAndForget);
        };
        let obj = obj.clone();
        match state
            .ops()
            .patch_remove_finalizer(&obj, KCP_FINALIZER)
            .await
        {
            Ok(removed) => {
                if removed {
                    info!("removed finalizer");
                }
                Some(Signal::StopAndForget)
            }
            Err(err) => retry(err, "remove finalizer"),
        }
    }
}
