//! Control-plane (KCP) resource kinds, API group `cloud-control.nimbus.dev`

/// IpRange: allocated CIDR block with per-zone subnet breakdown
pub mod iprange;
/// NfsInstance: managed NFS volume referencing an IpRange
pub mod nfs_instance;
/// Network: managed or referenced provider network
pub mod network;
/// RedisInstance / RedisCluster: managed caches referencing an IpRange
pub mod redis;
/// Scope: per-tenant cloud account/region binding
pub mod scope;
/// VpcPeering: peering between two Networks
pub mod vpc_peering;

pub use iprange::{IpRange, IpRangeOptions, IpRangeSpec, IpRangeStatus, IpRangeSubnet};
pub use nfs_instance::{NfsInstance, NfsInstanceSpec, NfsInstanceStatus};
pub use network::{
    ManagedNetwork, Network, NetworkInfo, NetworkReference, NetworkSpec, NetworkStatus,
    NetworkType,
};
pub use redis::{
    RedisCluster, RedisClusterSpec, RedisClusterStatus, RedisInstance, RedisInstanceSpec,
    RedisInstanceStatus,
};
pub use scope::{
    AwsScope, AzureScope, GcpScope, OpenStackScope, Scope, ScopeInfo, ScopeSpec, ScopeStatus,
};
pub use vpc_peering::{VpcPeering, VpcPeeringDetails, VpcPeeringSpec, VpcPeeringStatus};
