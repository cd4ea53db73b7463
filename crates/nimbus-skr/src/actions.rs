//! Pipeline actions of the tenant IpRange controller
//!
//! The tenant side never talks to a cloud provider. It projects the request
//! into the control plane, waits for the mirror to reach a terminal state,
//! and copies the effective allocation back.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{info, warn};
use uuid::Uuid;

use nimbus_common::crd::control::{IpRange as KcpIpRange, IpRangeSpec as KcpIpRangeSpec};
use nimbus_common::crd::types::{
    condition_types, reasons, Condition, ObjWithConditions, ScopeRef, StatusState,
};
use nimbus_common::{
    Error, LABEL_REMOTE_NAME, LABEL_REMOTE_NAMESPACE, LABEL_TENANT, SKR_FINALIZER,
};
use nimbus_pipeline::{Action, Flow, Signal, StatusPatch};

use crate::state::MirrorState;

/// Delay before re-checking a mirror that has not converged yet
pub const WAIT_DELAY: Duration = Duration::from_secs(10);

/// Transient error handling shared by all actions: log and requeue
pub(crate) fn retry(err: Error, what: &str) -> Flow {
    warn!(error = %err, "{what} failed, requeueing");
    Some(Signal::StopWithRequeue)
}

/// Finds the control-plane mirror by the link label triple
///
/// The link is the labels, not a stored name, so the lookup is always a
/// labeled list. When more than one mirror carries the labels the first by
/// name is used, keeping repeated reconciles on the same pick.
pub struct LoadMirror;

#[async_trait]
impl Action<MirrorState> for LoadMirror {
    fn name(&self) -> &str {
        "loadMirror"
    }

    async fn run(&self, state: &mut MirrorState) -> Flow {
        let remote = state.remote_ref();
        let mut mirrors = match state.mirrors.list_mirrors(&state.tenant, &remote).await {
            Ok(mirrors) => mirrors,
            Err(err) => return retry(err, "list mirrors"),
        };
        mirrors.sort_by_key(|m| m.name_any());
        if mirrors.len() > 1 {
            warn!(
                remote = %remote,
                count = mirrors.len(),
                picked = %mirrors[0].name_any(),
                "multiple mirrors linked to one origin, picking first by name"
            );
        }
        state.mirror = mirrors.into_iter().next();
        None
    }
}

/// Adds the deletion-hook finalizer on live objects
pub struct AddFinalizer;

#[async_trait]
impl Action<MirrorState> for AddFinalizer {
    fn name(&self) -> &str {
        "addFinalizer"
    }

    async fn run(&self, state: &mut MirrorState) -> Flow {
        if state.marked_for_deletion() || state.has_finalizer(SKR_FINALIZER) {
            return None;
        }
        let Some(obj) = state.obj() else {
            return Some(Signal::StopAndForget);
        };
        let obj = obj.clone();
        match state.ops().patch_add_finalizer(&obj, SKR_FINALIZER).await {
            Ok(added) => {
                if added {
                    info!("added finalizer");
                    if let Some(obj) = state.obj_mut() {
                        obj.metadata
                            .finalizers
                            .get_or_insert_with(Vec::new)
                            .push(SKR_FINALIZER.to_string());
                    }
                }
                None
            }
            Err(err) => retry(err, "add finalizer"),
        }
    }
}

/// Creates the control-plane mirror when none is linked yet
///
/// The mirror gets an opaque generated name; identity lives in the labels.
pub struct CreateMirror;

#[async_trait]
impl Action<MirrorState> for CreateMirror {
    fn name(&self) -> &str {
        "createMirror"
    }

    async fn run(&self, state: &mut MirrorState) -> Flow {
        if state.mirror.is_some() {
            return None;
        }
        let Some(obj) = state.obj() else {
            return Some(Signal::StopAndForget);
        };

        let remote = state.remote_ref();
        let labels = BTreeMap::from([
            (LABEL_TENANT.to_string(), state.tenant.clone()),
            (LABEL_REMOTE_NAME.to_string(), remote.name.clone()),
            (LABEL_REMOTE_NAMESPACE.to_string(), remote.namespace.clone()),
        ]);
        let mut mirror = KcpIpRange::new(
            &Uuid::new_v4().to_string(),
            KcpIpRangeSpec {
                remote_ref: remote,
                scope: ScopeRef {
                    name: state.tenant.clone(),
                },
                cidr: obj.spec.cidr.clone(),
                network: None,
                options: None,
            },
        );
        mirror.metadata.namespace = Some(state.kcp_namespace.clone());
        mirror.metadata.labels = Some(labels);

        match state.mirrors.create_mirror(&mirror).await {
            Ok(()) => {
                info!(mirror = %mirror.name_any(), "created control plane mirror");
                state.mirror = Some(mirror);
                None
            }
            Err(err) => retry(err, "create mirror"),
        }
    }
}

/// Waits for the mirror to reach Ready or Error
pub struct WaitMirror;

#[async_trait]
impl Action<MirrorState> for WaitMirror {
    fn name(&self) -> &str {
        "waitMirror"
    }

    async fn run(&self, state: &mut MirrorState) -> Flow {
        match state.mirror_state() {
            StatusState::Ready | StatusState::Error => None,
            _ => {
                StatusPatch::new()
                    .state(StatusState::Processing)
                    .requeue_after(WAIT_DELAY)
                    .run(state)
                    .await
            }
        }
    }
}

/// Copies the effective allocation and terminal conditions back to the tenant
pub struct CopyMirrorStatus;

#[async_trait]
impl Action<MirrorState> for CopyMirrorStatus {
    fn name(&self) -> &str {
        "copyMirrorStatus"
    }

    async fn run(&self, state: &mut MirrorState) -> Flow {
        let Some(mirror) = state.mirror.clone() else {
            return Some(Signal::StopWithRequeue);
        };

        let mut conditions: Vec<Condition> = mirror
            .conditions()
            .iter()
            .filter(|c| {
                c.type_ == condition_types::READY || c.type_ == condition_types::ERROR
            })
            .cloned()
            .collect();
        let target = match mirror.state() {
            StatusState::Error => {
                if conditions.is_empty() {
                    conditions.push(Condition::error(
                        reasons::MIRROR_ERROR,
                        "Control plane reported an error without details",
                    ));
                }
                StatusState::Error
            }
            _ => {
                if conditions.is_empty() {
                    conditions.push(Condition::ready());
                }
                StatusState::Ready
            }
        };

        if let Some(obj) = state.obj_mut() {
            let status = obj.status.get_or_insert_with(Default::default);
            status.cidr = mirror.status.as_ref().and_then(|s| s.cidr.clone());
            status.ranges = mirror
                .status
                .as_ref()
                .map(|s| s.ranges.clone())
                .unwrap_or_default();
        }

        StatusPatch::new()
            .state(target.clone())
            .set_exclusive_conditions(conditions)
            .success_log(format!("iprange is {target}"))
            .run(state)
            .await
    }
}

/// Deletion entry guard: nothing to clean up without our finalizer
pub struct RequireFinalizer;

#[async_trait]
impl Action<MirrorState> for RequireFinalizer {
    fn name(&self) -> &str {
        "requireFinalizer"
    }

    async fn run(&self, state: &mut MirrorState) -> Flow {
        if state.has_finalizer(SKR_FINALIZER) {
            None
        } else {
            Some(Signal::StopAndForget)
        }
    }
}

/// Marks the status as Deleting while teardown runs
pub struct MarkDeleting;

#[async_trait]
impl Action<MirrorState> for MarkDeleting {
    fn name(&self) -> &str {
        "markDeleting"
    }

    async fn run(&self, state: &mut MirrorState) -> Flow {
        StatusPatch::new()
            .state(StatusState::Deleting)
            .continue_flow()
            .run(state)
            .await
    }
}

/// Deletes the mirror and waits until it is gone
pub struct DeleteMirror;

#[async_trait]
impl Action<MirrorState> for DeleteMirror {
    fn name(&self) -> &str {
        "deleteMirror"
    }

    async fn run(&self, state: &mut MirrorState) -> Flow {
        let Some(mirror) = &state.mirror else {
            return None;
        };
        let name = mirror.name_any();
        match state.mirrors.delete_mirror(&name).await {
            Ok(()) => {
                info!(mirror = %name, "requested mirror deletion");
                Some(Signal::RequeueAfter(WAIT_DELAY))
            }
            Err(err) => retry(err, "delete mirror"),
        }
    }
}

/// Removes the finalizer once the mirror is gone, then stops for good
pub struct RemoveFinalizer;

#[async_trait]
impl Action<MirrorState> for RemoveFinalizer {
    fn name(&self) -> &str {
        "removeFinalizer"
    }

    async fn run(&self, state: &mut MirrorState) -> Flow {
        let Some(obj) = state.obj() else {
            return Some(Signal::StopAndForget);
        };
        let obj = obj.clone();
        match state
            .ops()
            .patch_remove_finalizer(&obj, SKR_FINALIZER)
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
