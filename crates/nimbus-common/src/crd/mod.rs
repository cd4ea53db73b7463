//! Custom resource definitions
//!
//! Two API groups mirror the two stores: `cloud-control.nimbus.dev` for the
//! central control plane (KCP) and `cloud-resources.nimbus.dev` for the
//! tenant runtime clusters (SKR).

/// Control-plane resource kinds
pub mod control;
/// Tenant-side resource kinds
pub mod tenant;
/// Shared supporting types: conditions, states, references
pub mod types;

pub use types::{
    condition_types, reasons, same_conditions, Condition, ConditionStatus, IpRangeRef, NetworkRef,
    ObjWithConditions, ProviderType, RemoteRef, ScopeRef, StatusState,
};
