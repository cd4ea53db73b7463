//! Control-plane IpRange controller
//!
//! Reconciles `cloud-control.nimbus.dev/IpRange`: validates or allocates the
//! CIDR, ensures the owning Network exists and is ready, runs the
//! provider-specific association and per-zone subnetting flow, optionally
//! peers the range's network with the tenant's shared network, and guards
//! deletion against resources still using the range.

#![deny(missing_docs)]

/// Pipeline actions, grouped by concern
pub mod actions;
/// Provider client traits, flows, and in-memory implementations
pub mod providers;
/// Reconciler entry point and pipeline assembly
pub mod reconciler;
/// Controller state layered over the focal Scope state
pub mod state;
/// Store traits for the objects this controller reads and writes
pub mod store;

pub use reconciler::IpRangeReconciler;
pub use state::IpRangeState;

/// Allocation configuration, threaded through state construction
#[derive(Clone, Debug)]
pub struct IpRangeConfig {
    /// Whether an empty `spec.cidr` triggers automatic allocation
    pub auto_cidr_allocation: bool,
    /// Prefix length of automatically allocated blocks
    pub default_prefix: u8,
}

impl Default for IpRangeConfig {
    fn default() -> Self {
        Self {
            auto_cidr_allocation: true,
            default_prefix: 24,
        }
    }
}
