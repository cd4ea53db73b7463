//! RedisInstance and RedisCluster CRDs: managed caches placed inside an
//! IpRange.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::types::{
    impl_obj_with_conditions, Condition, IpRangeRef, RemoteRef, ScopeRef, StatusState,
};

/// RedisInstance provisions a single-node managed cache.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cloud-control.nimbus.dev",
    version = "v1beta1",
    kind = "RedisInstance",
    namespaced,
    status = "RedisInstanceStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RedisInstanceSpec {
    /// Tenant-side origin of this instance
    pub remote_ref: RemoteRef,

    /// Owning Scope
    pub scope: ScopeRef,

    /// IpRange the cache endpoint is placed in
    pub ip_range: IpRangeRef,

    /// Provider tier/size identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

/// Status for a RedisInstance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedisInstanceStatus {
    /// Lifecycle state
    #[serde(default)]
    pub state: StatusState,

    /// Primary endpoint of the cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Identifier of a long-running provider operation being polled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_identifier: Option<String>,

    /// Conditions representing the instance state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl_obj_with_conditions!(RedisInstance, RedisInstanceStatus);

/// RedisCluster provisions a sharded managed cache.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cloud-control.nimbus.dev",
    version = "v1beta1",
    kind = "RedisCluster",
    namespaced,
    status = "RedisClusterStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterSpec {
    /// Tenant-side origin of this cluster
    pub remote_ref: RemoteRef,

    /// Owning Scope
    pub scope: ScopeRef,

    /// IpRange the cache endpoints are placed in
    pub ip_range: IpRangeRef,

    /// Number of shards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_count: Option<i32>,
}

/// Status for a RedisCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterStatus {
    /// Lifecycle state
    #[serde(default)]
    pub state: StatusState,

    /// Discovery endpoint of the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Identifier of a long-running provider operation being polled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_identifier: Option<String>,

    /// Conditions representing the cluster state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl_obj_with_conditions!(RedisCluster, RedisClusterStatus);
