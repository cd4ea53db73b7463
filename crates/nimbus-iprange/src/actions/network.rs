//! Network dependency of the range
//!
//! Every range belongs to a Network, by default the Scope's shared one. A
//! missing shared network is an inconsistency someone else must repair; a
//! missing dedicated network is created here from the allocated CIDR and
//! waited on.

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::info;

use nimbus_common::crd::control::Network;
use nimbus_common::crd::reasons;
use nimbus_common::crd::types::{Condition, StatusState};
use nimbus_pipeline::{Action, Flow, HasScope, Signal, StatusPatch};

use crate::actions::{retry, BUSY_DELAY, LONG_DELAY};
use crate::state::IpRangeState;

/// Loads the range's network and, when distinct, the Scope's shared network
pub struct LoadNetworks;

#[async_trait]
impl Action<IpRangeState> for LoadNetworks {
    fn name(&self) -> &str {
        "loadNetworks"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some(network_name) = state.network_name() else {
            return Some(Signal::StopWithRequeue);
        };
        let Some(shared_name) = state.scope().map(|s| s.shared_network_name()) else {
            return Some(Signal::StopWithRequeue);
        };
        let namespace = state.key().namespace.clone();

        state.network = match state.networks.get_network(&namespace, &network_name).await {
            Ok(network) => network,
            Err(err) => return retry(err, "load network"),
        };
        if network_name != shared_name {
            state.shared_network =
                match state.networks.get_network(&namespace, &shared_name).await {
                    Ok(network) => network,
                    Err(err) => return retry(err, "load shared network"),
                };
        }
        None
    }
}

/// Creates the dedicated network when absent; a missing shared network is an
/// inconsistency reported with a long backoff
pub struct EnsureNetwork;

#[async_trait]
impl Action<IpRangeState> for EnsureNetwork {
    fn name(&self) -> &str {
        "ensureNetwork"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        if state.network.is_some() {
            return None;
        }
        let Some(network_name) = state.network_name() else {
            return Some(Signal::StopWithRequeue);
        };
        let Some(scope) = state.scope() else {
            return Some(Signal::StopWithRequeue);
        };
        let scope_name = scope.name_any();
        let shared_name = scope.shared_network_name();
        let location = scope.spec.region.clone();

        if network_name == shared_name {
            let flow = StatusPatch::new()
                .state(StatusState::Error)
                .set_exclusive_conditions(vec![Condition::error(
                    reasons::SHARED_NETWORK_MISSING,
                    format!("Shared network {shared_name} does not exist"),
                )])
                .requeue_after(LONG_DELAY)
                .error_log("failed to record missing shared network")
                .run(state)
                .await;
            return flow;
        }

        let Some(cidr) = state.allocated else {
            return Some(Signal::StopWithRequeue);
        };
        let namespace = state.key().namespace.clone();
        let network = Network::new_managed(
            &network_name,
            &namespace,
            &scope_name,
            cidr.to_string(),
            &location,
        );
        if let Err(err) = state.networks.create_network(&network).await {
            return retry(err, "create network");
        }
        info!(network = %network_name, "created dedicated network, waiting for it");
        Some(Signal::RequeueAfter(BUSY_DELAY))
    }
}

/// Waits for the range's network to report Ready
pub struct WaitNetworkReady;

#[async_trait]
impl Action<IpRangeState> for WaitNetworkReady {
    fn name(&self) -> &str {
        "waitNetworkReady"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some(network) = &state.network else {
            return Some(Signal::RequeueAfter(BUSY_DELAY));
        };
        if network.has_error() {
            let name = network.name_any();
            return StatusPatch::new()
                .state(StatusState::Error)
                .set_exclusive_conditions(vec![Condition::error(
                    reasons::NETWORK_ERROR,
                    format!("Network {name} is in error state"),
                )])
                .requeue_after(LONG_DELAY)
                .error_log("failed to record network error")
                .run(state)
                .await;
        }
        if !network.is_ready() {
            info!(network = %network.name_any(), "network not ready yet");
            return Some(Signal::RequeueAfter(BUSY_DELAY));
        }
        None
    }
}

/// Copies the network's provider id into status where the provider flow does
/// not supply one itself
pub struct CopyNetworkId;

#[async_trait]
impl Action<IpRangeState> for CopyNetworkId {
    fn name(&self) -> &str {
        "copyNetworkId"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let network_id = state
            .network
            .as_ref()
            .and_then(|n| n.status.as_ref())
            .and_then(|s| s.network_id.clone());
        let Some(network_id) = network_id else {
            return None;
        };
        if let Some(obj) = state.obj_mut() {
            obj.status_mut().vpc_id = Some(network_id);
        }
        if let Err(err) = state.persist_status().await {
            return retry(err, "persist network id");
        }
        None
    }
}

/// Deletes the dedicated network on teardown and waits until it is gone;
/// the shared network is never touched
pub struct DeleteDedicatedNetwork;

#[async_trait]
impl Action<IpRangeState> for DeleteDedicatedNetwork {
    fn name(&self) -> &str {
        "deleteDedicatedNetwork"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        if !state.uses_dedicated_network() {
            return None;
        }
        if state.network.is_none() {
            // already gone
            return None;
        }
        let Some(network_name) = state.network_name() else {
            return Some(Signal::StopWithRequeue);
        };
        let namespace = state.key().namespace.clone();
        if let Err(err) = state.networks.delete_network(&namespace, &network_name).await {
            return retry(err, "delete network");
        }
        info!(network = %network_name, "deleted dedicated network, waiting for removal");
        Some(Signal::RequeueAfter(BUSY_DELAY))
    }
}
