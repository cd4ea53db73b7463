//! Peering between a dedicated network and the Scope's shared network
//!
//! Ranges on a dedicated network get a VpcPeering so resources placed in the
//! range stay reachable from the tenant's shared network. The peering is a
//! resource of its own with a Ready condition dependents wait on.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use tracing::info;

use nimbus_common::crd::control::{VpcPeering, VpcPeeringDetails, VpcPeeringSpec};
use nimbus_common::crd::reasons;
use nimbus_common::crd::types::{Condition, NetworkRef, ScopeRef, StatusState};
use nimbus_pipeline::{Action, Flow, HasScope, Signal, StatusPatch};

use crate::actions::{retry, BUSY_DELAY, LONG_DELAY};
use crate::state::IpRangeState;

/// Whether the range's network needs peering with the shared network
pub fn needs_peering(state: &IpRangeState) -> bool {
    state.uses_dedicated_network()
}

/// Loads the peering, creating it when absent
pub struct EnsurePeering;

#[async_trait]
impl Action<IpRangeState> for EnsurePeering {
    fn name(&self) -> &str {
        "ensurePeering"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let (Some(peering_name), Some(network_name)) =
            (state.peering_name(), state.network_name())
        else {
            return Some(Signal::StopWithRequeue);
        };
        let Some(scope) = state.scope() else {
            return Some(Signal::StopWithRequeue);
        };
        let scope_name = scope.name_any();
        let shared_name = scope.shared_network_name();
        let namespace = state.key().namespace.clone();

        state.peering = match state.peerings.get_peering(&namespace, &peering_name).await {
            Ok(peering) => peering,
            Err(err) => return retry(err, "load peering"),
        };
        if state.peering.is_some() {
            return None;
        }

        let peering = VpcPeering {
            metadata: ObjectMeta {
                name: Some(peering_name.clone()),
                namespace: Some(namespace),
                ..Default::default()
            },
            spec: VpcPeeringSpec {
                scope: ScopeRef { name: scope_name },
                details: VpcPeeringDetails {
                    local_network: NetworkRef { name: network_name },
                    remote_network: NetworkRef { name: shared_name },
                    delete_remote_peering: false,
                },
            },
            status: None,
        };
        if let Err(err) = state.peerings.create_peering(&peering).await {
            return retry(err, "create peering");
        }
        info!(peering = %peering_name, "created peering, waiting for it");
        Some(Signal::RequeueAfter(BUSY_DELAY))
    }
}

/// Waits for the peering to report Ready
pub struct WaitPeeringReady;

#[async_trait]
impl Action<IpRangeState> for WaitPeeringReady {
    fn name(&self) -> &str {
        "waitPeeringReady"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some(peering) = &state.peering else {
            return Some(Signal::RequeueAfter(BUSY_DELAY));
        };
        if peering.has_error() {
            let name = peering.name_any();
            return StatusPatch::new()
                .state(StatusState::Error)
                .set_exclusive_conditions(vec![Condition::error(
                    reasons::PEERING_ERROR,
                    format!("Peering {name} is in error state"),
                )])
                .requeue_after(LONG_DELAY)
                .error_log("failed to record peering error")
                .run(state)
                .await;
        }
        if !peering.is_ready() {
            info!(peering = %peering.name_any(), "peering not ready yet");
            return Some(Signal::RequeueAfter(BUSY_DELAY));
        }
        None
    }
}

/// Deletes the peering on teardown and waits until it is gone
pub struct DeletePeering;

#[async_trait]
impl Action<IpRangeState> for DeletePeering {
    fn name(&self) -> &str {
        "deletePeering"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        if !needs_peering(state) {
            return None;
        }
        let Some(peering_name) = state.peering_name() else {
            return Some(Signal::StopWithRequeue);
        };
        let namespace = state.key().namespace.clone();
        let existing = match state.peerings.get_peering(&namespace, &peering_name).await {
            Ok(peering) => peering,
            Err(err) => return retry(err, "load peering"),
        };
        if existing.is_none() {
            return None;
        }
        if let Err(err) = state.peerings.delete_peering(&namespace, &peering_name).await {
            return retry(err, "delete peering");
        }
        info!(peering = %peering_name, "deleted peering, waiting for removal");
        Some(Signal::RequeueAfter(BUSY_DELAY))
    }
}
