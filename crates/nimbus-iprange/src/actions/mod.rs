//! Pipeline actions of the IpRange controller
//!
//! Every action re-derives "is this already done?" from observed state before
//! acting, so a crash between any two steps leaves the pipeline resumable
//! from the top.

use std::time::Duration;

use tracing::warn;

use nimbus_common::Error;
use nimbus_pipeline::{Flow, Signal};

/// CIDR validation, allocation, and the status copy
pub mod allocate;
/// Deletion guards and state marking
pub mod delete_guard;
/// Finalizer add/remove
pub mod finalizer;
/// Network dependency resolution
pub mod network;
/// Peering with the shared network
pub mod peering;
/// Per-zone range splitting
pub mod ranges;
/// Terminal Ready status
pub mod ready;
/// Scope resolution
pub mod scope;

/// Delay between polls of an in-flight provider operation
pub const POLL_DELAY: Duration = Duration::from_secs(10);

/// Delay before re-checking a blocked deletion or a not-yet-ready dependency
pub const BUSY_DELAY: Duration = Duration::from_secs(10);

/// Delay for inconsistencies that need outside repair before retrying
pub const LONG_DELAY: Duration = Duration::from_secs(300);

/// Transient error handling shared by all actions: log and requeue
pub(crate) fn retry(err: Error, what: &str) -> Flow {
    warn!(error = %err, "{what} failed, requeueing");
    Some(Signal::StopWithRequeue)
}
