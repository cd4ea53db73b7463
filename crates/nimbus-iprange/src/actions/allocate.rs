//! CIDR validation, automatic allocation, and the immutable status copy

use async_trait::async_trait;
use tracing::info;

use nimbus_common::cidr::Cidr;
use nimbus_common::crd::reasons;
use nimbus_common::crd::types::{Condition, StatusState};
use nimbus_pipeline::{Action, Flow, HasScope, Signal, StatusPatch};

use crate::actions::retry;
use crate::state::IpRangeState;

async fn fail_validation(state: &mut IpRangeState, reason: &str, message: String) -> Flow {
    StatusPatch::new()
        .state(StatusState::Error)
        .set_exclusive_conditions(vec![Condition::error(reason, message)])
        .error_log("failed to record cidr validation failure")
        .run(state)
        .await
}

/// Settles the effective CIDR for this run
///
/// Once `status.cidr` is set it is the effective CIDR forever; a spec that
/// disagrees is rejected with `CidrCanNotChange`. Before that, the spec CIDR
/// is validated against the Scope's topology ranges and sibling IpRanges, or
/// a fresh block is allocated when the spec leaves the choice to us.
pub struct ResolveCidr;

#[async_trait]
impl Action<IpRangeState> for ResolveCidr {
    fn name(&self) -> &str {
        "resolveCidr"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some(obj) = state.obj() else {
            return Some(Signal::StopAndForget);
        };
        let spec_cidr = obj.spec.cidr.clone();
        let name = state.name();

        if let Some(status_cidr) = state.status_cidr() {
            if let Some(spec_cidr) = &spec_cidr {
                if spec_cidr != &status_cidr {
                    return fail_validation(
                        state,
                        reasons::CIDR_CAN_NOT_CHANGE,
                        format!("CIDR is {status_cidr} and can not change to {spec_cidr}"),
                    )
                    .await;
                }
            }
            return match status_cidr.parse::<Cidr>() {
                Ok(cidr) => {
                    state.allocated = Some(cidr);
                    None
                }
                Err(err) => {
                    fail_validation(state, reasons::INVALID_CIDR, err.to_string()).await
                }
            };
        }

        let Some(scope) = state.scope() else {
            return Some(Signal::StopWithRequeue);
        };
        let scope_name = kube::ResourceExt::name_any(scope);
        let topology = scope.spec.existing_cidr_ranges.clone();
        let namespace = state.key().namespace.clone();

        let mut taken = match Cidr::parse_all("scope topology", &topology) {
            Ok(cidrs) => cidrs,
            Err(err) => {
                return fail_validation(state, reasons::INVALID_CIDR, err.to_string()).await
            }
        };
        let siblings = match state
            .siblings
            .sibling_cidrs(&namespace, &scope_name, &name)
            .await
        {
            Ok(cidrs) => cidrs,
            Err(err) => return retry(err, "list sibling ranges"),
        };
        match Cidr::parse_all("sibling ranges", &siblings) {
            Ok(cidrs) => taken.extend(cidrs),
            Err(err) => {
                return fail_validation(state, reasons::INVALID_CIDR, err.to_string()).await
            }
        }

        match spec_cidr {
            Some(spec_cidr) => {
                let cidr = match spec_cidr.parse::<Cidr>() {
                    Ok(cidr) => cidr,
                    Err(err) => {
                        return fail_validation(state, reasons::INVALID_CIDR, err.to_string())
                            .await
                    }
                };
                if let Some(other) = taken.iter().find(|t| t.overlaps(&cidr)) {
                    return fail_validation(
                        state,
                        reasons::CIDR_OVERLAP,
                        format!("CIDR {cidr} overlaps {other}"),
                    )
                    .await;
                }
                state.allocated = Some(cidr);
                None
            }
            None if state.config.auto_cidr_allocation => {
                match Cidr::allocate(state.config.default_prefix, &taken) {
                    Some(cidr) => {
                        info!(cidr = %cidr, "allocated cidr");
                        state.allocated = Some(cidr);
                        None
                    }
                    None => {
                        fail_validation(
                            state,
                            reasons::CIDR_ALLOCATION_FAILED,
                            format!(
                                "No free /{} block left in the private pools",
                                state.config.default_prefix
                            ),
                        )
                        .await
                    }
                }
            }
            None => {
                fail_validation(
                    state,
                    reasons::CIDR_REQUIRED,
                    "CIDR is required because automatic allocation is disabled".to_string(),
                )
                .await
            }
        }
    }
}

/// Writes the settled CIDR into status, once
pub struct CopyCidrToStatus;

#[async_trait]
impl Action<IpRangeState> for CopyCidrToStatus {
    fn name(&self) -> &str {
        "copyCidrToStatus"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some(cidr) = state.allocated else {
            return Some(Signal::StopWithRequeue);
        };
        if let Some(obj) = state.obj_mut() {
            let status = obj.status_mut();
            if status.cidr.as_deref() != Some(cidr.to_string().as_str()) {
                status.cidr = Some(cidr.to_string());
                status.state = StatusState::Processing;
            }
        }
        if let Err(err) = state.persist_status().await {
            return retry(err, "persist cidr");
        }
        None
    }
}
