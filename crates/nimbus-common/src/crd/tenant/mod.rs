//! Tenant-side (SKR) resource kinds, API group `cloud-resources.nimbus.dev`

/// Tenant-facing IpRange that is mirrored into the control plane
pub mod iprange;

pub use iprange::{IpRange, IpRangeSpec, IpRangeStatus};
