//! Tenant-facing IpRange CRD
//!
//! The tenant-side controller mirrors this resource into a control-plane
//! IpRange (linked by labels, not by a stored foreign key) and copies the
//! effective allocation back once the mirror converges.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::types::{impl_obj_with_conditions, Condition, StatusState};

/// IpRange requested by a tenant workload.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cloud-resources.nimbus.dev",
    version = "v1beta1",
    kind = "IpRange",
    namespaced,
    status = "IpRangeStatus",
    printcolumn = r#"{"name":"Cidr","type":"string","jsonPath":".status.cidr"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IpRangeSpec {
    /// Requested CIDR; empty means automatic allocation in the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
}

/// Status for a tenant IpRange
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IpRangeStatus {
    /// Lifecycle state
    #[serde(default)]
    pub state: StatusState,

    /// Effective CIDR copied back from the control-plane mirror
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,

    /// Per-zone split copied back from the control-plane mirror
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<String>,

    /// Conditions representing the range state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl_obj_with_conditions!(IpRange, IpRangeStatus);
