//! GCP flow: global address reservation and private service access
//!
//! GCP reserves the whole range as a global address and attaches it to a
//! service networking connection. Both calls return long-running operations;
//! the operation id is parked in `status.op_identifier` and polled with
//! delayed requeues, one operation in flight at a time.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::info;

use nimbus_common::crd::control::IpRangeOptions;
use nimbus_common::crd::reasons;
use nimbus_common::crd::types::{Condition, StatusState};
use nimbus_common::Result;
use nimbus_pipeline::{Action, Flow, HasScope, Pipeline, Signal, StatusPatch};

use crate::actions::{retry, POLL_DELAY};
use crate::state::IpRangeState;

/// A reserved global address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalAddress {
    /// Reservation name
    pub name: String,
    /// Reserved CIDR
    pub cidr: String,
}

/// Terminal or in-flight state of a long-running operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationState {
    /// Still running
    InProgress,
    /// Finished successfully
    Done,
    /// Finished with the given error message
    Failed(String),
}

/// Narrow GCP surface of the IpRange flow
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GcpIpRangeClient: Send + Sync {
    /// Poll a long-running operation
    async fn get_operation(&self, project: &str, operation: &str) -> Result<OperationState>;

    /// Fetch a global address reservation, `None` when absent
    async fn get_global_address(&self, project: &str, name: &str)
        -> Result<Option<GlobalAddress>>;

    /// Reserve a global address; returns the operation id
    async fn create_global_address(&self, project: &str, name: &str, cidr: &str)
        -> Result<String>;

    /// Release a global address; returns the operation id, `None` when the
    /// reservation was already gone
    async fn delete_global_address(&self, project: &str, name: &str) -> Result<Option<String>>;

    /// Names of the reservations attached to the service connection, `None`
    /// when no connection exists
    async fn get_psa_connection(
        &self,
        project: &str,
        network: &str,
        service: &str,
    ) -> Result<Option<Vec<String>>>;

    /// Create or update the service connection to carry exactly the given
    /// reservations; returns the operation id
    async fn ensure_psa_connection(
        &self,
        project: &str,
        network: &str,
        service: &str,
        reserved_ranges: &[String],
    ) -> Result<String>;

    /// Remove this reservation from the service connection, dropping the
    /// connection when it was the last one; returns the operation id, `None`
    /// when there was nothing to remove
    async fn remove_psa_range(
        &self,
        project: &str,
        network: &str,
        service: &str,
        reserved_range: &str,
    ) -> Result<Option<String>>;
}

/// Provisioning flow for GCP scopes
pub fn provision_pipeline() -> Pipeline<IpRangeState> {
    Pipeline::named("gcpIpRange")
        .step(WaitOperation)
        .step(ProjectRanges)
        .step(EnsureGlobalAddress)
        .step(EnsurePsaConnection)
}

/// Teardown flow for GCP scopes
pub fn teardown_pipeline() -> Pipeline<IpRangeState> {
    Pipeline::named("gcpIpRangeDelete")
        .step(WaitOperation)
        .step(RemovePsaRange)
        .step(DeleteGlobalAddress)
}

fn gcp_scope(state: &IpRangeState) -> Option<(String, String)> {
    let scope = state.scope()?;
    match &scope.spec.scope_info {
        nimbus_common::crd::control::ScopeInfo::Gcp(gcp) => {
            Some((gcp.project.clone(), gcp.vpc_network_name.clone()))
        }
        _ => None,
    }
}

fn psa_service(state: &IpRangeState) -> String {
    state
        .obj()
        .and_then(|o| o.spec.options.as_ref())
        .and_then(|o| match o {
            IpRangeOptions::Gcp(gcp) => Some(gcp.psa_service.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "servicenetworking.googleapis.com".to_string())
}

/// Settles the operation parked in `status.op_identifier` before any new
/// mutation is issued
pub struct WaitOperation;

#[async_trait]
impl Action<IpRangeState> for WaitOperation {
    fn name(&self) -> &str {
        "waitGcpOperation"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some(operation) = state.op_identifier() else {
            return None;
        };
        let Some((project, _)) = gcp_scope(state) else {
            return Some(Signal::Fatal(nimbus_common::Error::internal(
                "gcpIpRange",
                "gcp pipeline dispatched for non-gcp scope",
            )));
        };
        let outcome = match state.providers.gcp.get_operation(&project, &operation).await {
            Ok(outcome) => outcome,
            Err(err) => return retry(err, "poll operation"),
        };
        match outcome {
            OperationState::InProgress => {
                info!(operation = %operation, "operation still running");
                Some(Signal::RequeueAfter(POLL_DELAY))
            }
            OperationState::Done => {
                if let Some(obj) = state.obj_mut() {
                    obj.status_mut().op_identifier = None;
                }
                if let Err(err) = state.persist_status().await {
                    return retry(err, "clear operation id");
                }
                None
            }
            OperationState::Failed(message) => {
                if let Some(obj) = state.obj_mut() {
                    obj.status_mut().op_identifier = None;
                }
                StatusPatch::new()
                    .state(StatusState::Error)
                    .set_exclusive_conditions(vec![Condition::error(
                        reasons::OPERATION_FAILED,
                        format!("Operation {operation} failed: {message}"),
                    )])
                    .error_log("failed to record operation failure")
                    .run(state)
                    .await
            }
        }
    }
}

/// Records the whole range as the single entry of `status.ranges`
pub struct ProjectRanges;

#[async_trait]
impl Action<IpRangeState> for ProjectRanges {
    fn name(&self) -> &str {
        "projectRanges"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        if !state.status_ranges().is_empty() {
            return None;
        }
        let Some(cidr) = state.status_cidr() else {
            return Some(Signal::StopWithRequeue);
        };
        if let Some(obj) = state.obj_mut() {
            obj.status_mut().ranges = vec![cidr];
        }
        if let Err(err) = state.persist_status().await {
            return retry(err, "persist ranges");
        }
        None
    }
}

/// Reserves the global address for the range
pub struct EnsureGlobalAddress;

#[async_trait]
impl Action<IpRangeState> for EnsureGlobalAddress {
    fn name(&self) -> &str {
        "ensureGlobalAddress"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some((project, _)) = gcp_scope(state) else {
            return Some(Signal::StopWithRequeue);
        };
        let name = state.name();
        match state.providers.gcp.get_global_address(&project, &name).await {
            Ok(Some(_)) => return None,
            Ok(None) => {}
            Err(err) => return retry(err, "get global address"),
        }
        let Some(cidr) = state.status_cidr() else {
            return Some(Signal::StopWithRequeue);
        };
        let operation = match state
            .providers
            .gcp
            .create_global_address(&project, &name, &cidr)
            .await
        {
            Ok(operation) => operation,
            Err(err) => return retry(err, "create global address"),
        };
        info!(address = %name, operation = %operation, "reserving global address");
        if let Some(obj) = state.obj_mut() {
            obj.status_mut().op_identifier = Some(operation);
            obj.status_mut().id = Some(name);
        }
        if let Err(err) = state.persist_status().await {
            return retry(err, "persist operation id");
        }
        Some(Signal::RequeueAfter(POLL_DELAY))
    }
}

/// Attaches the reservation to the service networking connection
pub struct EnsurePsaConnection;

#[async_trait]
impl Action<IpRangeState> for EnsurePsaConnection {
    fn name(&self) -> &str {
        "ensurePsaConnection"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some((project, network)) = gcp_scope(state) else {
            return Some(Signal::StopWithRequeue);
        };
        let service = psa_service(state);
        let name = state.name();

        let attached = match state
            .providers
            .gcp
            .get_psa_connection(&project, &network, &service)
            .await
        {
            Ok(attached) => attached,
            Err(err) => return retry(err, "get psa connection"),
        };
        let mut reserved = attached.unwrap_or_default();
        if reserved.iter().any(|r| r == &name) {
            return None;
        }
        reserved.push(name.clone());

        let operation = match state
            .providers
            .gcp
            .ensure_psa_connection(&project, &network, &service, &reserved)
            .await
        {
            Ok(operation) => operation,
            Err(err) => return retry(err, "ensure psa connection"),
        };
        info!(address = %name, operation = %operation, "attaching range to psa connection");
        if let Some(obj) = state.obj_mut() {
            obj.status_mut().op_identifier = Some(operation);
        }
        if let Err(err) = state.persist_status().await {
            return retry(err, "persist operation id");
        }
        Some(Signal::RequeueAfter(POLL_DELAY))
    }
}

/// Detaches the reservation from the service connection on teardown
pub struct RemovePsaRange;

#[async_trait]
impl Action<IpRangeState> for RemovePsaRange {
    fn name(&self) -> &str {
        "removePsaRange"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some((project, network)) = gcp_scope(state) else {
            return None;
        };
        let service = psa_service(state);
        let name = state.name();
        let operation = match state
            .providers
            .gcp
            .remove_psa_range(&project, &network, &service, &name)
            .await
        {
            Ok(operation) => operation,
            Err(err) => return retry(err, "remove psa range"),
        };
        let Some(operation) = operation else {
            return None;
        };
        if let Some(obj) = state.obj_mut() {
            obj.status_mut().op_identifier = Some(operation);
        }
        if let Err(err) = state.persist_status().await {
            return retry(err, "persist operation id");
        }
        Some(Signal::RequeueAfter(POLL_DELAY))
    }
}

/// Releases the global address on teardown
pub struct DeleteGlobalAddress;

#[async_trait]
impl Action<IpRangeState> for DeleteGlobalAddress {
    fn name(&self) -> &str {
        "deleteGlobalAddress"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some((project, _)) = gcp_scope(state) else {
            return None;
        };
        let name = state.name();
        let operation = match state.providers.gcp.delete_global_address(&project, &name).await {
            Ok(operation) => operation,
            Err(err) => return retry(err, "delete global address"),
        };
        let Some(operation) = operation else {
            return None;
        };
        info!(address = %name, operation = %operation, "releasing global address");
        if let Some(obj) = state.obj_mut() {
            obj.status_mut().op_identifier = Some(operation);
        }
        if let Err(err) = state.persist_status().await {
            return retry(err, "persist operation id");
        }
        Some(Signal::RequeueAfter(POLL_DELAY))
    }
}
