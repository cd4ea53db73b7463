//! Provider clients and provider-specific pipeline flows
//!
//! Each provider exposes a narrow client trait covering only the calls the
//! IpRange flow needs; the controller interprets success, already-exists,
//! not-found, and in-progress outcomes and nothing else. The in-memory
//! implementations back tests and SDK-less deployments.

use std::sync::Arc;

/// AWS client trait and association/subnetting flow
pub mod aws;
/// GCP client trait and PSA flow with operation polling
pub mod gcp;
/// In-memory provider implementations
pub mod mock;

/// Shared handles to all provider clients, cloned into each reconcile state
#[derive(Clone)]
pub struct ProviderClients {
    /// AWS VPC/subnet operations
    pub aws: Arc<dyn aws::AwsIpRangeClient>,
    /// GCP global address and service networking operations
    pub gcp: Arc<dyn gcp::GcpIpRangeClient>,
}

impl ProviderClients {
    /// Clients backed by a single in-memory cloud
    pub fn in_memory() -> (Self, Arc<mock::InMemoryCloud>) {
        let cloud = Arc::new(mock::InMemoryCloud::new());
        (
            Self {
                aws: cloud.clone(),
                gcp: cloud.clone(),
            },
            cloud,
        )
    }
}
