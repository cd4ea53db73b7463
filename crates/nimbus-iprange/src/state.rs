//! IpRange controller state
//!
//! Wraps the focal Scope layer with the stores, provider clients, allocation
//! config, and the dependents loaded during the run. Actions written against
//! the lower layers keep working here through `Deref`.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use kube::ResourceExt;

use nimbus_common::cidr::Cidr;
use nimbus_common::crd::control::{IpRange, Network, Scope, VpcPeering};
use nimbus_pipeline::{FocalState, HasScope, ObjKey, ObjectOps, ScopeOps};

use crate::providers::aws::VpcInfo;
use crate::providers::ProviderClients;
use crate::store::{NetworkStore, PeeringStore, SiblingStore, UsageStore};
use crate::IpRangeConfig;

/// Everything the IpRange pipeline reads and writes
pub struct IpRangeState {
    focal: FocalState<IpRange>,
    pub(crate) networks: Arc<dyn NetworkStore>,
    pub(crate) peerings: Arc<dyn PeeringStore>,
    pub(crate) usage: Arc<dyn UsageStore>,
    pub(crate) siblings: Arc<dyn SiblingStore>,
    pub(crate) providers: ProviderClients,
    pub(crate) config: IpRangeConfig,

    /// Effective CIDR for this run, from status or freshly allocated
    pub(crate) allocated: Option<Cidr>,
    /// The network the range belongs to, once loaded
    pub(crate) network: Option<Network>,
    /// The Scope's shared network, when distinct from `network`
    pub(crate) shared_network: Option<Network>,
    /// Peering between the two, once loaded
    pub(crate) peering: Option<VpcPeering>,
    /// Provider VPC snapshot, once described
    pub(crate) vpc: Option<VpcInfo>,
}

impl IpRangeState {
    /// Build state for one reconcile
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ops: Arc<dyn ObjectOps<IpRange>>,
        scope_ops: Arc<dyn ScopeOps>,
        networks: Arc<dyn NetworkStore>,
        peerings: Arc<dyn PeeringStore>,
        usage: Arc<dyn UsageStore>,
        siblings: Arc<dyn SiblingStore>,
        providers: ProviderClients,
        config: IpRangeConfig,
        key: ObjKey,
    ) -> Self {
        Self {
            focal: FocalState::new(ops, scope_ops, key),
            networks,
            peerings,
            usage,
            siblings,
            providers,
            config,
            allocated: None,
            network: None,
            shared_network: None,
            peering: None,
            vpc: None,
        }
    }

    /// Name of the network the range belongs to; defaults to the Scope's
    /// shared network when the spec names none
    pub fn network_name(&self) -> Option<String> {
        let obj = self.focal.obj()?;
        if let Some(network) = &obj.spec.network {
            return Some(network.name.clone());
        }
        self.scope().map(Scope::shared_network_name)
    }

    /// Whether the range uses a dedicated network rather than the shared one
    pub fn uses_dedicated_network(&self) -> bool {
        match (self.network_name(), self.scope()) {
            (Some(name), Some(scope)) => name != scope.shared_network_name(),
            _ => false,
        }
    }

    /// Name of the peering between the range's network and the shared one.
    /// Keyed by network name: a range owns at most one dedicated network and
    /// a network carries at most one peering to the shared network, so the
    /// name is unique within the namespace.
    pub fn peering_name(&self) -> Option<String> {
        self.network_name().map(|n| format!("{n}--peering"))
    }

    /// Effective CIDR recorded in status
    pub fn status_cidr(&self) -> Option<String> {
        self.focal
            .obj()
            .and_then(|o| o.status.as_ref())
            .and_then(|s| s.cidr.clone())
    }

    /// Per-zone ranges recorded in status
    pub fn status_ranges(&self) -> Vec<String> {
        self.focal
            .obj()
            .and_then(|o| o.status.as_ref())
            .map(|s| s.ranges.clone())
            .unwrap_or_default()
    }

    /// Pending provider operation id recorded in status
    pub fn op_identifier(&self) -> Option<String> {
        self.focal
            .obj()
            .and_then(|o| o.status.as_ref())
            .and_then(|s| s.op_identifier.clone())
    }

    /// Name of the reconciled range
    pub fn name(&self) -> String {
        self.focal
            .obj()
            .map(|o| o.name_any())
            .unwrap_or_else(|| self.focal.key().name.clone())
    }
}

impl Deref for IpRangeState {
    type Target = FocalState<IpRange>;

    fn deref(&self) -> &Self::Target {
        &self.focal
    }
}

impl DerefMut for IpRangeState {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.focal
    }
}

impl HasScope for IpRangeState {
    fn scope(&self) -> Option<&Scope> {
        self.focal.scope()
    }
}
