//! IpRange CRD: an allocated or validated CIDR block and its per-zone subnet
//! breakdown in the tenant's network.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::types::{
    impl_obj_with_conditions, Condition, NetworkRef, RemoteRef, ScopeRef, StatusState,
};

/// IpRange describes a block of the tenant's address space reserved for
/// cloud resources (NFS volumes, caches).
///
/// An empty `spec.cidr` means "allocate automatically". Once the effective
/// CIDR lands in `status.cidr` it never changes.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cloud-control.nimbus.dev",
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
    /// Tenant-side origin of this range
    pub remote_ref: RemoteRef,

    /// Owning Scope
    pub scope: ScopeRef,

    /// Requested CIDR; empty means automatic allocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,

    /// Network this range belongs to and creates subnets in.
    /// Defaults to the Scope's shared network when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkRef>,

    /// Provider-specific options; at most one variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<IpRangeOptions>,
}

/// Provider-specific IpRange options; the enum enforces at-most-one
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum IpRangeOptions {
    /// GCP private service access options
    Gcp(IpRangeGcp),
    /// AWS options (none currently)
    Aws(IpRangeAws),
    /// Azure options (none currently)
    Azure(IpRangeAzure),
}

/// GCP private service access options
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IpRangeGcp {
    /// Service the PSA connection is established with
    #[serde(default = "IpRangeGcp::default_psa_service")]
    pub psa_service: String,
}

impl IpRangeGcp {
    fn default_psa_service() -> String {
        "servicenetworking.googleapis.com".to_string()
    }
}

impl Default for IpRangeGcp {
    fn default() -> Self {
        Self {
            psa_service: Self::default_psa_service(),
        }
    }
}

/// AWS IpRange options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct IpRangeAws {}

/// Azure IpRange options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct IpRangeAzure {}

/// A subnet created for one zone of the range
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IpRangeSubnet {
    /// Provider identifier of the subnet
    pub id: String,
    /// Availability zone the subnet lives in
    pub zone: String,
    /// CIDR block of the subnet
    pub range: String,
}

/// Status for an IpRange
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IpRangeStatus {
    /// Lifecycle state
    #[serde(default)]
    pub state: StatusState,

    /// Effective CIDR; immutable once set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,

    /// Per-zone split of the effective CIDR; not recomputed once set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<String>,

    /// Provider id of the VPC the range is associated with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,

    /// Subnets created for the zones of the range
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<IpRangeSubnet>,

    /// Conditions representing the range state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Identifier of a long-running provider operation being polled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_identifier: Option<String>,

    /// Provider identifier of the allocated range object, where one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl_obj_with_conditions!(IpRange, IpRangeStatus);

impl IpRange {
    /// The effective CIDR recorded in status, if any
    pub fn effective_cidr(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.cidr.as_deref())
    }

    /// Mutable status, materialized on demand
    pub fn status_mut(&mut self) -> &mut IpRangeStatus {
        self.status.get_or_insert_with(IpRangeStatus::default)
    }
}
