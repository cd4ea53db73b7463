//! Common types for Nimbus: CRDs, errors, CIDR arithmetic, and telemetry

#![deny(missing_docs)]

/// IPv4 CIDR parsing, overlap checks, splitting, and allocation
pub mod cidr;
/// Custom resource definitions for the control plane and tenant stores
pub mod crd;
/// Error types shared across controllers
pub mod error;
/// Tracing subscriber initialization
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Finalizer held by control-plane controllers on cloud-control resources
pub const KCP_FINALIZER: &str = "cloud-control.nimbus.dev/deletion-hook";

/// Finalizer held by tenant-side controllers on cloud-resources resources
pub const SKR_FINALIZER: &str = "cloud-resources.nimbus.dev/deletion-hook";

/// Label carrying the tenant cluster identity on mirror resources
pub const LABEL_TENANT: &str = "nimbus.dev/tenant";

/// Label carrying the tenant-side origin name on mirror resources
pub const LABEL_REMOTE_NAME: &str = "nimbus.dev/remote-name";

/// Label carrying the tenant-side origin namespace on mirror resources
pub const LABEL_REMOTE_NAMESPACE: &str = "nimbus.dev/remote-namespace";

/// Label binding a Scope to its tenant identity, used for fallback lookup
pub const LABEL_SCOPE_TENANT: &str = "nimbus.dev/scope-tenant";
