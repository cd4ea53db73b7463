//! VpcPeering CRD: connects a local and a remote Network. Dependents wait on
//! its Ready condition before proceeding.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::types::{
    condition_types, impl_obj_with_conditions, Condition, ConditionStatus, NetworkRef, ScopeRef,
    StatusState,
};

/// VpcPeering connects two Networks at the provider.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cloud-control.nimbus.dev",
    version = "v1beta1",
    kind = "VpcPeering",
    namespaced,
    status = "VpcPeeringStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VpcPeeringSpec {
    /// Owning Scope
    pub scope: ScopeRef,

    /// Networks to connect
    pub details: VpcPeeringDetails,
}

/// The two sides of a peering
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VpcPeeringDetails {
    /// Network on the local (cloud-resources) side
    pub local_network: NetworkRef,

    /// Network on the remote (shared) side
    pub remote_network: NetworkRef,

    /// Whether to also remove the remote-side peering on delete
    #[serde(default)]
    pub delete_remote_peering: bool,
}

/// Status for a VpcPeering
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VpcPeeringStatus {
    /// Lifecycle state
    #[serde(default)]
    pub state: StatusState,

    /// Provider identifier of the peering connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Conditions representing the peering state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl_obj_with_conditions!(VpcPeering, VpcPeeringStatus);

impl VpcPeering {
    /// Whether the peering reports Ready=True
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.conditions
                .iter()
                .any(|c| c.type_ == condition_types::READY && c.status == ConditionStatus::True)
        })
    }

    /// Whether the peering reports an Error state or condition
    pub fn has_error(&self) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.state == StatusState::Error
                || s.conditions
                    .iter()
                    .any(|c| c.type_ == condition_types::ERROR && c.status == ConditionStatus::True)
        })
    }
}
