//! AWS flow: VPC lookup, CIDR association, and per-zone subnets
//!
//! AWS is the one provider requiring an explicit VPC CIDR association before
//! subnets can be created. Association is matched by CIDR value, never by
//! association id, because a restarted reconcile has no memory of the id it
//! requested.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{info, warn};

use nimbus_common::crd::types::{Condition, StatusState};
use nimbus_common::crd::reasons;
use nimbus_common::Result;
use nimbus_pipeline::{Action, Flow, HasScope, Pipeline, Signal, StatusPatch};

use crate::actions::{retry, POLL_DELAY};
use crate::state::IpRangeState;

/// Snapshot of a VPC and its CIDR associations
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VpcInfo {
    /// Provider id of the VPC
    pub id: String,
    /// CIDR blocks associated with the VPC
    pub associations: Vec<CidrAssociation>,
}

/// One CIDR block association on a VPC
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CidrAssociation {
    /// Provider id of the association
    pub id: String,
    /// Associated CIDR block
    pub cidr: String,
    /// Association lifecycle state
    pub state: AssociationState,
}

/// Lifecycle of a VPC CIDR association
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssociationState {
    /// Association requested, not yet effective
    Associating,
    /// Association effective
    Associated,
    /// Association failed
    Failed,
}

/// One subnet observed at or created by the provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubnetInfo {
    /// Provider id of the subnet
    pub id: String,
    /// Availability zone
    pub zone: String,
    /// CIDR block of the subnet
    pub cidr: String,
}

/// Narrow AWS surface of the IpRange flow
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AwsIpRangeClient: Send + Sync {
    /// Describe the VPC with the given name tag, `None` when absent
    async fn describe_vpc(
        &self,
        account_id: &str,
        region: &str,
        name: &str,
    ) -> Result<Option<VpcInfo>>;

    /// Request association of a CIDR block with the VPC
    async fn associate_vpc_cidr(&self, vpc_id: &str, cidr: &str) -> Result<()>;

    /// Disassociate a CIDR block from the VPC
    async fn disassociate_vpc_cidr(&self, vpc_id: &str, association_id: &str) -> Result<()>;

    /// Subnets carrying the given uniqueness tag
    async fn describe_subnets(&self, vpc_id: &str, tag: &str) -> Result<Vec<SubnetInfo>>;

    /// Create a subnet tagged for idempotent re-creation
    async fn create_subnet(
        &self,
        vpc_id: &str,
        zone: &str,
        cidr: &str,
        tag: &str,
    ) -> Result<SubnetInfo>;

    /// Delete a subnet; absent subnets are treated as already deleted
    async fn delete_subnet(&self, subnet_id: &str) -> Result<()>;
}

/// Provisioning flow for AWS scopes
pub fn provision_pipeline() -> Pipeline<IpRangeState> {
    Pipeline::named("awsIpRange")
        .step(LoadVpc::required())
        .step(EnsureCidrAssociated)
        .step(crate::actions::ranges::SplitRanges)
        .step(EnsureSubnets)
}

/// Teardown flow for AWS scopes
pub fn teardown_pipeline() -> Pipeline<IpRangeState> {
    Pipeline::named("awsIpRangeDelete")
        .step(LoadVpc::optional())
        .step(DeleteSubnets)
        .step(DisassociateCidr)
}

fn aws_scope(state: &IpRangeState) -> Option<(String, String, String)> {
    let scope = state.scope()?;
    match &scope.spec.scope_info {
        nimbus_common::crd::control::ScopeInfo::Aws(aws) => Some((
            aws.account_id.clone(),
            scope.spec.region.clone(),
            aws.vpc_network_name.clone(),
        )),
        _ => None,
    }
}

/// Describes the tenant VPC and records its id in status
pub struct LoadVpc {
    required: bool,
}

impl LoadVpc {
    /// Missing VPC is an Error condition (provisioning)
    pub fn required() -> Self {
        Self { required: true }
    }

    /// Missing VPC means nothing left to clean up (teardown)
    pub fn optional() -> Self {
        Self { required: false }
    }
}

#[async_trait]
impl Action<IpRangeState> for LoadVpc {
    fn name(&self) -> &str {
        "loadVpc"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        if state.vpc.is_some() {
            return None;
        }
        let Some((account_id, region, vpc_name)) = aws_scope(state) else {
            return Some(Signal::Fatal(nimbus_common::Error::internal(
                "awsIpRange",
                "aws pipeline dispatched for non-aws scope",
            )));
        };
        let vpc = match state
            .providers
            .aws
            .describe_vpc(&account_id, &region, &vpc_name)
            .await
        {
            Ok(vpc) => vpc,
            Err(err) => return retry(err, "describe vpc"),
        };
        let Some(vpc) = vpc else {
            if !self.required {
                return None;
            }
            return StatusPatch::new()
                .state(StatusState::Error)
                .set_exclusive_conditions(vec![Condition::error(
                    reasons::VPC_NOT_FOUND,
                    format!("VPC {vpc_name} not found"),
                )])
                .error_log("failed to record missing vpc")
                .run(state)
                .await;
        };
        if let Some(obj) = state.obj_mut() {
            obj.status_mut().vpc_id = Some(vpc.id.clone());
        }
        if let Err(err) = state.persist_status().await {
            return retry(err, "persist vpc id");
        }
        state.vpc = Some(vpc);
        None
    }
}

/// Ensures the effective CIDR is associated with the VPC, polling while the
/// association settles
pub struct EnsureCidrAssociated;

#[async_trait]
impl Action<IpRangeState> for EnsureCidrAssociated {
    fn name(&self) -> &str {
        "ensureCidrAssociated"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some(cidr) = state.status_cidr() else {
            return Some(Signal::Fatal(nimbus_common::Error::internal(
                "awsIpRange",
                "association before cidr was settled",
            )));
        };
        let Some(vpc) = &state.vpc else {
            return Some(Signal::StopWithRequeue);
        };

        match vpc.associations.iter().find(|a| a.cidr == cidr) {
            Some(a) if a.state == AssociationState::Associated => None,
            Some(a) if a.state == AssociationState::Associating => {
                info!(cidr = %cidr, "cidr association in progress");
                Some(Signal::RequeueAfter(POLL_DELAY))
            }
            Some(_) => {
                StatusPatch::new()
                    .state(StatusState::Error)
                    .set_exclusive_conditions(vec![Condition::error(
                        reasons::CIDR_ASSOCIATION_FAILED,
                        format!("Association of {cidr} with VPC {} failed", vpc.id),
                    )])
                    .error_log("failed to record association failure")
                    .run(state)
                    .await
            }
            None => {
                let vpc_id = vpc.id.clone();
                if let Err(err) = state.providers.aws.associate_vpc_cidr(&vpc_id, &cidr).await {
                    return retry(err, "associate cidr");
                }
                info!(cidr = %cidr, vpc = %vpc_id, "requested cidr association");
                Some(Signal::RequeueAfter(POLL_DELAY))
            }
        }
    }
}

/// Creates per-zone subnets from `status.ranges`, preserving the zone/range
/// pairing already observed at the provider
pub struct EnsureSubnets;

#[async_trait]
impl Action<IpRangeState> for EnsureSubnets {
    fn name(&self) -> &str {
        "ensureSubnets"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some(vpc) = state.vpc.clone() else {
            return Some(Signal::StopWithRequeue);
        };
        let Some(scope) = state.scope() else {
            return Some(Signal::StopWithRequeue);
        };
        let zones = scope.spec.zones.clone();
        let ranges = state.status_ranges();
        let tag = state.name();

        let observed = match state.providers.aws.describe_subnets(&vpc.id, &tag).await {
            Ok(subnets) => subnets,
            Err(err) => return retry(err, "describe subnets"),
        };

        // keep what exists: zones and ranges already paired at the provider
        // stay paired, the rest are matched up in stable order
        let mut subnets: Vec<SubnetInfo> = Vec::new();
        let mut free_ranges: Vec<String> = ranges
            .iter()
            .filter(|r| !observed.iter().any(|s| s.cidr.as_str() == r.as_str()))
            .cloned()
            .collect();
        for zone in &zones {
            if let Some(existing) = observed.iter().find(|s| &s.zone == zone) {
                subnets.push(existing.clone());
                continue;
            }
            if free_ranges.is_empty() {
                warn!(zone = %zone, "no range left for zone");
                continue;
            }
            let range = free_ranges.remove(0);
            match state
                .providers
                .aws
                .create_subnet(&vpc.id, zone, &range, &tag)
                .await
            {
                Ok(subnet) => subnets.push(subnet),
                Err(err) => return retry(err, "create subnet"),
            }
        }

        if let Some(obj) = state.obj_mut() {
            obj.status_mut().subnets = subnets
                .into_iter()
                .map(|s| nimbus_common::crd::control::IpRangeSubnet {
                    id: s.id,
                    zone: s.zone,
                    range: s.cidr,
                })
                .collect();
        }
        if let Err(err) = state.persist_status().await {
            return retry(err, "persist subnets");
        }
        None
    }
}

/// Deletes the range's subnets on teardown
pub struct DeleteSubnets;

#[async_trait]
impl Action<IpRangeState> for DeleteSubnets {
    fn name(&self) -> &str {
        "deleteSubnets"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let Some(vpc) = state.vpc.clone() else {
            // vpc is gone, nothing to clean
            return None;
        };
        let tag = state.name();
        let observed = match state.providers.aws.describe_subnets(&vpc.id, &tag).await {
            Ok(subnets) => subnets,
            Err(err) => return retry(err, "describe subnets"),
        };
        for subnet in observed {
            if let Err(err) = state.providers.aws.delete_subnet(&subnet.id).await {
                return retry(err, "delete subnet");
            }
            info!(subnet = %subnet.id, "deleted subnet");
        }
        None
    }
}

/// Disassociates the range's CIDR from the VPC on teardown
pub struct DisassociateCidr;

#[async_trait]
impl Action<IpRangeState> for DisassociateCidr {
    fn name(&self) -> &str {
        "disassociateCidr"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        let (Some(vpc), Some(cidr)) = (state.vpc.clone(), state.status_cidr()) else {
            return None;
        };
        let Some(association) = vpc.associations.iter().find(|a| a.cidr == cidr) else {
            return None;
        };
        if let Err(err) = state
            .providers
            .aws
            .disassociate_vpc_cidr(&vpc.id, &association.id)
            .await
        {
            return retry(err, "disassociate cidr");
        }
        info!(cidr = %cidr, vpc = %vpc.id, "disassociated cidr");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn association_state_matching_is_by_value() {
        let vpc = VpcInfo {
            id: "vpc-1".into(),
            associations: vec![CidrAssociation {
                id: "assoc-1".into(),
                cidr: "10.0.1.0/24".into(),
                state: AssociationState::Associated,
            }],
        };
        assert!(vpc.associations.iter().any(|a| a.cidr == "10.0.1.0/24"));
        assert!(!vpc.associations.iter().any(|a| a.cidr == "10.0.2.0/24"));
    }

    #[test]
    fn poll_delay_is_ten_seconds() {
        assert_eq!(POLL_DELAY, Duration::from_secs(10));
    }
}
