//! Tenant-side (SKR) IpRange controller
//!
//! Implements the cross-store mirror pattern: a tenant IpRange is shadowed by
//! a control-plane IpRange linked through a stable label triple, never a
//! stored foreign key. The controller creates the mirror, waits for it to
//! reach a terminal state, and copies the effective allocation back into the
//! tenant resource's status.

#![deny(missing_docs)]

/// Pipeline actions of the mirror flow
pub mod actions;
/// Reconciler entry point and pipeline assembly
pub mod reconciler;
/// Controller state carrying the tenant object and its mirror
pub mod state;
/// Store trait for control-plane mirrors
pub mod store;

pub use reconciler::SkrIpRangeReconciler;
pub use state::MirrorState;
