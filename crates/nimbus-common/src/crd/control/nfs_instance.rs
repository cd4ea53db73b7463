//! NfsInstance CRD: a managed NFS volume placed inside an IpRange.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::types::{
    impl_obj_with_conditions, Condition, IpRangeRef, RemoteRef, ScopeRef, StatusState,
};

/// NfsInstance provisions a provider file store reachable from the tenant's
/// network through the referenced IpRange.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cloud-control.nimbus.dev",
    version = "v1beta1",
    kind = "NfsInstance",
    namespaced,
    status = "NfsInstanceStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NfsInstanceSpec {
    /// Tenant-side origin of this instance
    pub remote_ref: RemoteRef,

    /// Owning Scope
    pub scope: ScopeRef,

    /// IpRange the volume endpoint is placed in
    pub ip_range: IpRangeRef,

    /// Requested capacity in GiB, where the provider supports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_gb: Option<i64>,
}

/// Status for an NfsInstance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NfsInstanceStatus {
    /// Lifecycle state
    #[serde(default)]
    pub state: StatusState,

    /// Host the volume is served from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Identifier of a long-running provider operation being polled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_identifier: Option<String>,

    /// Conditions representing the instance state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl_obj_with_conditions!(NfsInstance, NfsInstanceStatus);
