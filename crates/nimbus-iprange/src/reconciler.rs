//! IpRange reconciler: pipeline assembly and the controller entry points

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action as ReconcileAction;
use kube::{Client, ResourceExt};
use tracing::{error, info, warn};

use nimbus_common::crd::control::IpRange;
use nimbus_common::crd::ProviderType;
use nimbus_common::Error;
use nimbus_pipeline::{
    case, handle, provider_is, switch, when, Action, DynAction, KubeOps, KubeScopeOps, ObjKey,
    ObjectOps, Pipeline, ScopeOps,
};

use crate::actions::allocate::{CopyCidrToStatus, ResolveCidr};
use crate::actions::delete_guard::{MarkDeleting, PreventDeleteWhileUsed, RequireFinalizer};
use crate::actions::finalizer::{AddFinalizer, RemoveFinalizer};
use crate::actions::network::{
    CopyNetworkId, DeleteDedicatedNetwork, EnsureNetwork, LoadNetworks, WaitNetworkReady,
};
use crate::actions::peering::{needs_peering, DeletePeering, EnsurePeering, WaitPeeringReady};
use crate::actions::ranges::SplitRanges;
use crate::actions::ready::StatusReady;
use crate::actions::scope::LoadScope;
use crate::providers::{aws, gcp, ProviderClients};
use crate::state::IpRangeState;
use crate::store::{KubeStores, NetworkStore, PeeringStore, SiblingStore, UsageStore};
use crate::IpRangeConfig;

/// Flow for providers whose address space is implied by the managed network:
/// split the range and project the network id, no association step
fn lean_pipeline(name: &str) -> Pipeline<IpRangeState> {
    Pipeline::named(name).step(SplitRanges).step(CopyNetworkId)
}

fn provider_switch() -> impl Action<IpRangeState> {
    switch(
        "providerIpRange",
        None,
        vec![
            case(provider_is(ProviderType::Aws), aws::provision_pipeline()),
            case(provider_is(ProviderType::Gcp), gcp::provision_pipeline()),
            case(provider_is(ProviderType::Azure), lean_pipeline("azureIpRange")),
            case(
                provider_is(ProviderType::OpenStack),
                lean_pipeline("openstackIpRange"),
            ),
        ],
    )
}

fn provider_teardown_switch() -> impl Action<IpRangeState> {
    switch(
        "providerIpRangeDelete",
        None,
        vec![
            case(provider_is(ProviderType::Aws), aws::teardown_pipeline()),
            case(provider_is(ProviderType::Gcp), gcp::teardown_pipeline()),
        ],
    )
}

fn provisioning_pipeline() -> Pipeline<IpRangeState> {
    Pipeline::named("crIpRangeProvision")
        .step(AddFinalizer)
        .step(ResolveCidr)
        .step(CopyCidrToStatus)
        .step(LoadNetworks)
        .step(EnsureNetwork)
        .step(WaitNetworkReady)
        .step(provider_switch())
        .step(when(
            needs_peering,
            Pipeline::named("iprangePeering")
                .step(EnsurePeering)
                .step(WaitPeeringReady),
        ))
        .step(StatusReady)
}

fn deletion_pipeline() -> Pipeline<IpRangeState> {
    Pipeline::named("crIpRangeDelete")
        .step(RequireFinalizer)
        .step(PreventDeleteWhileUsed)
        .step(MarkDeleting)
        .step(LoadNetworks)
        .step(provider_teardown_switch())
        .step(DeletePeering)
        .step(DeleteDedicatedNetwork)
        .step(RemoveFinalizer)
}

fn main_pipeline() -> Pipeline<IpRangeState> {
    Pipeline::named("crIpRangeMain").step(LoadScope).step(switch(
        "crIpRangeLifecycle",
        Some(Arc::new(provisioning_pipeline()) as DynAction<IpRangeState>),
        vec![case(
            |s: &IpRangeState| s.marked_for_deletion(),
            deletion_pipeline(),
        )],
    ))
}

/// Reconciles control-plane IpRanges
pub struct IpRangeReconciler {
    ops: Arc<dyn ObjectOps<IpRange>>,
    scope_ops: Arc<dyn ScopeOps>,
    networks: Arc<dyn NetworkStore>,
    peerings: Arc<dyn PeeringStore>,
    usage: Arc<dyn UsageStore>,
    siblings: Arc<dyn SiblingStore>,
    providers: ProviderClients,
    config: IpRangeConfig,
}

impl IpRangeReconciler {
    /// Reconciler over the Kubernetes API
    pub fn new(client: Client, providers: ProviderClients, config: IpRangeConfig) -> Self {
        let stores = Arc::new(KubeStores::new(client.clone()));
        Self {
            ops: Arc::new(KubeOps::new(client.clone())),
            scope_ops: Arc::new(KubeScopeOps::new(client)),
            networks: stores.clone(),
            peerings: stores.clone(),
            usage: stores.clone(),
            siblings: stores,
            providers,
            config,
        }
    }

    /// Reconciler over explicit stores, for tests and SDK-less wiring
    #[allow(clippy::too_many_arguments)]
    pub fn with_stores(
        ops: Arc<dyn ObjectOps<IpRange>>,
        scope_ops: Arc<dyn ScopeOps>,
        networks: Arc<dyn NetworkStore>,
        peerings: Arc<dyn PeeringStore>,
        usage: Arc<dyn UsageStore>,
        siblings: Arc<dyn SiblingStore>,
        providers: ProviderClients,
        config: IpRangeConfig,
    ) -> Self {
        Self {
            ops,
            scope_ops,
            networks,
            peerings,
            usage,
            siblings,
            providers,
            config,
        }
    }

    fn state_for(&self, key: ObjKey) -> IpRangeState {
        IpRangeState::new(
            self.ops.clone(),
            self.scope_ops.clone(),
            self.networks.clone(),
            self.peerings.clone(),
            self.usage.clone(),
            self.siblings.clone(),
            self.providers.clone(),
            self.config.clone(),
            key,
        )
    }

    /// One reconcile pass, driven by `kube::runtime::Controller`
    pub async fn reconcile(&self, obj: Arc<IpRange>) -> Result<ReconcileAction, Error> {
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        info!(iprange = %name, "reconciling");

        let mut state = self.state_for(ObjKey::new(namespace, name));
        match state.load().await {
            Ok(true) => {}
            Ok(false) => {
                info!("iprange is gone, nothing to do");
                return Ok(ReconcileAction::await_change());
            }
            Err(err) => {
                warn!(error = %err, "failed to load iprange, requeueing");
                return Ok(ReconcileAction::requeue(Duration::ZERO));
            }
        }

        let flow = main_pipeline().run(&mut state).await;
        handle(flow)
    }

    /// Fatal errors are logged and wait for the next change event
    pub fn error_policy(&self, obj: Arc<IpRange>, err: &Error) -> ReconcileAction {
        error!(iprange = %obj.name_any(), error = %err, "reconcile failed");
        ReconcileAction::await_change()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    use nimbus_common::cidr::Cidr;
    use nimbus_common::crd::control::{
        AwsScope, GcpScope, IpRangeSpec, Network, NetworkStatus, Scope, ScopeInfo, ScopeSpec,
        VpcPeering,
    };
    use nimbus_common::crd::types::{
        condition_types, reasons, Condition, RemoteRef, ScopeRef, StatusState,
    };
    use nimbus_common::{Result, KCP_FINALIZER};
    use nimbus_pipeline::ObjKey;

    /// In-memory control plane: every store trait over shared maps
    #[derive(Default)]
    struct FakeKcp {
        ipranges: Mutex<HashMap<String, IpRange>>,
        scopes: Mutex<HashMap<String, Scope>>,
        networks: Mutex<HashMap<String, Network>>,
        peerings: Mutex<HashMap<String, VpcPeering>>,
        users: Mutex<Vec<(String, String)>>,
    }

    impl FakeKcp {
        fn put_iprange(&self, obj: IpRange) {
            self.ipranges
                .lock()
                .unwrap()
                .insert(obj.name_any(), obj);
        }

        fn iprange(&self, name: &str) -> IpRange {
            self.ipranges.lock().unwrap().get(name).cloned().unwrap()
        }

        fn put_scope(&self, obj: Scope) {
            self.scopes.lock().unwrap().insert(obj.name_any(), obj);
        }

        fn put_network(&self, obj: Network) {
            self.networks.lock().unwrap().insert(obj.name_any(), obj);
        }

        fn add_user(&self, iprange: &str, user: &str) {
            self.users
                .lock()
                .unwrap()
                .push((iprange.to_string(), user.to_string()));
        }

        fn clear_users(&self) {
            self.users.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl ObjectOps<IpRange> for FakeKcp {
        async fn get(&self, key: &ObjKey) -> Result<Option<IpRange>> {
            Ok(self.ipranges.lock().unwrap().get(&key.name).cloned())
        }

        async fn patch_status(&self, obj: &IpRange) -> Result<()> {
            let mut map = self.ipranges.lock().unwrap();
            if let Some(stored) = map.get_mut(&obj.name_any()) {
                stored.status = obj.status.clone();
            }
            Ok(())
        }

        async fn patch_add_finalizer(&self, obj: &IpRange, finalizer: &str) -> Result<bool> {
            let mut map = self.ipranges.lock().unwrap();
            if let Some(stored) = map.get_mut(&obj.name_any()) {
                let finalizers = stored.metadata.finalizers.get_or_insert_with(Vec::new);
                if finalizers.iter().any(|f| f == finalizer) {
                    return Ok(false);
                }
                finalizers.push(finalizer.to_string());
                return Ok(true);
            }
            Ok(false)
        }

        async fn patch_remove_finalizer(&self, obj: &IpRange, finalizer: &str) -> Result<bool> {
            let mut map = self.ipranges.lock().unwrap();
            if let Some(stored) = map.get_mut(&obj.name_any()) {
                if let Some(finalizers) = stored.metadata.finalizers.as_mut() {
                    let before = finalizers.len();
                    finalizers.retain(|f| f != finalizer);
                    return Ok(finalizers.len() != before);
                }
            }
            Ok(false)
        }
    }

    #[async_trait]
    impl ScopeOps for FakeKcp {
        async fn get_scope(&self, _namespace: &str, name: &str) -> Result<Option<Scope>> {
            Ok(self.scopes.lock().unwrap().get(name).cloned())
        }

        async fn list_scopes_by_tenant(
            &self,
            _namespace: &str,
            tenant: &str,
        ) -> Result<Vec<Scope>> {
            Ok(self
                .scopes
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.spec.tenant == tenant)
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl NetworkStore for FakeKcp {
        async fn get_network(&self, _namespace: &str, name: &str) -> Result<Option<Network>> {
            Ok(self.networks.lock().unwrap().get(name).cloned())
        }

        async fn create_network(&self, network: &Network) -> Result<()> {
            let mut map = self.networks.lock().unwrap();
            // created networks come up ready right away in the fake
            let mut network = network.clone();
            network.status = Some(NetworkStatus {
                state: StatusState::Ready,
                network_id: Some(format!("net-{}", network.name_any())),
                conditions: vec![Condition::ready()],
            });
            map.entry(network.name_any()).or_insert(network);
            Ok(())
        }

        async fn delete_network(&self, _namespace: &str, name: &str) -> Result<()> {
            self.networks.lock().unwrap().remove(name);
            Ok(())
        }
    }

    #[async_trait]
    impl PeeringStore for FakeKcp {
        async fn get_peering(&self, _namespace: &str, name: &str) -> Result<Option<VpcPeering>> {
            Ok(self.peerings.lock().unwrap().get(name).cloned())
        }

        async fn create_peering(&self, peering: &VpcPeering) -> Result<()> {
            let mut map = self.peerings.lock().unwrap();
            let mut peering = peering.clone();
            peering.status = Some(nimbus_common::crd::control::VpcPeeringStatus {
                state: StatusState::Ready,
                id: Some(format!("pcx-{}", peering.name_any())),
                conditions: vec![Condition::ready()],
            });
            map.entry(peering.name_any()).or_insert(peering);
            Ok(())
        }

        async fn delete_peering(&self, _namespace: &str, name: &str) -> Result<()> {
            self.peerings.lock().unwrap().remove(name);
            Ok(())
        }
    }

    #[async_trait]
    impl UsageStore for FakeKcp {
        async fn users_of(&self, _namespace: &str, iprange_name: &str) -> Result<Vec<String>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .filter(|(range, _)| range == iprange_name)
                .map(|(_, user)| user.clone())
                .collect())
        }
    }

    #[async_trait]
    impl SiblingStore for FakeKcp {
        async fn sibling_cidrs(
            &self,
            _namespace: &str,
            scope_name: &str,
            exclude_name: &str,
        ) -> Result<Vec<String>> {
            Ok(self
                .ipranges
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.name_any() != exclude_name && r.spec.scope.name == scope_name)
                .filter_map(|r| r.effective_cidr().map(str::to_string))
                .collect())
        }
    }

    fn sample_scope(existing: &[&str], zones: &[&str]) -> Scope {
        let mut spec = ScopeSpec::new(
            "tenant-a",
            "eu-west-1",
            ScopeInfo::Aws(AwsScope {
                account_id: "111111".into(),
                vpc_network_name: "wire-vpc".into(),
            }),
        );
        spec.zones = zones.iter().map(|z| z.to_string()).collect();
        spec.existing_cidr_ranges = existing.iter().map(|c| c.to_string()).collect();
        let mut scope = Scope::new("tenant-a", spec);
        scope.metadata.namespace = Some("kcp-system".into());
        scope
    }

    fn ready_shared_network(scope: &Scope) -> Network {
        let mut network = Network::new_managed(
            scope.shared_network_name(),
            "kcp-system",
            "tenant-a",
            "10.0.0.0/24",
            "eu-west-1",
        );
        network.spec.network_type = nimbus_common::crd::control::NetworkType::Shared;
        network.status = Some(NetworkStatus {
            state: StatusState::Ready,
            network_id: Some("vpc-shared".into()),
            conditions: vec![Condition::ready()],
        });
        network
    }

    fn sample_iprange(name: &str, cidr: Option<&str>) -> IpRange {
        IpRange {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("kcp-system".into()),
                ..Default::default()
            },
            spec: IpRangeSpec {
                remote_ref: RemoteRef {
                    namespace: "default".into(),
                    name: name.into(),
                },
                scope: ScopeRef {
                    name: "tenant-a".into(),
                },
                cidr: cidr.map(str::to_string),
                network: None,
                options: None,
            },
            status: None,
        }
    }

    struct Harness {
        kcp: Arc<FakeKcp>,
        cloud: Arc<crate::providers::mock::InMemoryCloud>,
        reconciler: IpRangeReconciler,
    }

    fn harness(config: IpRangeConfig) -> Harness {
        let kcp = Arc::new(FakeKcp::default());
        let (providers, cloud) = ProviderClients::in_memory();
        let reconciler = IpRangeReconciler::with_stores(
            kcp.clone(),
            kcp.clone(),
            kcp.clone(),
            kcp.clone(),
            kcp.clone(),
            kcp.clone(),
            providers,
            config,
        );
        Harness {
            kcp,
            cloud,
            reconciler,
        }
    }

    fn seed_aws_tenant(h: &Harness, existing: &[&str], zones: &[&str]) {
        let scope = sample_scope(existing, zones);
        h.kcp.put_network(ready_shared_network(&scope));
        h.kcp.put_scope(scope);
        h.cloud.add_vpc("111111", "eu-west-1", "wire-vpc");
    }

    fn seed_gcp_tenant(h: &Harness) {
        let mut spec = ScopeSpec::new(
            "tenant-a",
            "europe-west1",
            ScopeInfo::Gcp(GcpScope {
                project: "proj-a".into(),
                vpc_network_name: "wire-vpc".into(),
            }),
        );
        spec.zones = vec!["europe-west1-b".into()];
        let mut scope = Scope::new("tenant-a", spec);
        scope.metadata.namespace = Some("kcp-system".into());
        h.kcp.put_network(ready_shared_network(&scope));
        h.kcp.put_scope(scope);
    }

    /// Drives reconciles until the controller waits for a change event,
    /// returning every scheduling decision along the way
    async fn run_to_rest(h: &Harness, name: &str, max: usize) -> Vec<ReconcileAction> {
        let mut actions = Vec::new();
        for _ in 0..max {
            let obj = Arc::new(h.kcp.iprange(name));
            let action = h.reconciler.reconcile(obj).await.unwrap();
            let done = action == ReconcileAction::await_change();
            actions.push(action);
            if done {
                return actions;
            }
        }
        panic!("did not settle within {max} reconciles: {actions:?}");
    }

    #[tokio::test]
    async fn allocates_disjoint_cidr_and_becomes_ready() {
        let h = harness(IpRangeConfig::default());
        seed_aws_tenant(&h, &["10.0.0.0/24"], &["eu-west-1a", "eu-west-1b", "eu-west-1c"]);
        h.kcp.put_iprange(sample_iprange("range-1", None));

        run_to_rest(&h, "range-1", 10).await;

        let range = h.kcp.iprange("range-1");
        let status = range.status.unwrap();
        assert_eq!(status.cidr.as_deref(), Some("10.0.1.0/24"));
        assert_eq!(status.state, StatusState::Ready);
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].type_, condition_types::READY);

        let allocated: Cidr = status.cidr.unwrap().parse().unwrap();
        let taken: Cidr = "10.0.0.0/24".parse().unwrap();
        assert!(!allocated.overlaps(&taken));
    }

    #[tokio::test]
    async fn association_polls_with_ten_second_requeues() {
        let h = harness(IpRangeConfig::default());
        seed_aws_tenant(&h, &[], &["eu-west-1a"]);
        h.kcp
            .put_iprange(sample_iprange("range-1", Some("10.1.0.0/24")));

        let actions = run_to_rest(&h, "range-1", 10).await;

        // at least one pass requested the association and one observed it
        // still associating, both scheduling a 10s poll
        let polls = actions
            .iter()
            .filter(|a| **a == ReconcileAction::requeue(Duration::from_secs(10)))
            .count();
        assert!(polls >= 2, "expected polling requeues, got {actions:?}");

        let status = h.kcp.iprange("range-1").status.unwrap();
        assert_eq!(status.state, StatusState::Ready);
        let vpc_id = status.vpc_id.unwrap();
        assert_eq!(h.cloud.associations_of(&vpc_id), vec!["10.1.0.0/24"]);
    }

    #[tokio::test]
    async fn three_zones_get_three_subnets() {
        let h = harness(IpRangeConfig::default());
        seed_aws_tenant(&h, &[], &["eu-west-1a", "eu-west-1b", "eu-west-1c"]);
        h.kcp
            .put_iprange(sample_iprange("range-1", Some("10.1.0.0/24")));

        run_to_rest(&h, "range-1", 10).await;

        let status = h.kcp.iprange("range-1").status.unwrap();
        assert_eq!(
            status.ranges,
            vec!["10.1.0.0/26", "10.1.0.64/26", "10.1.0.128/26"]
        );
        assert_eq!(status.subnets.len(), 3);
        assert_eq!(h.cloud.subnet_count("range-1"), 3);
        let zones: Vec<_> = status.subnets.iter().map(|s| s.zone.clone()).collect();
        assert_eq!(zones, vec!["eu-west-1a", "eu-west-1b", "eu-west-1c"]);
    }

    #[tokio::test]
    async fn cidr_change_is_rejected() {
        let h = harness(IpRangeConfig::default());
        seed_aws_tenant(&h, &[], &["eu-west-1a"]);
        h.kcp
            .put_iprange(sample_iprange("range-1", Some("10.1.0.0/24")));
        run_to_rest(&h, "range-1", 10).await;

        let mut edited = h.kcp.iprange("range-1");
        edited.spec.cidr = Some("10.2.0.0/24".into());
        h.kcp.put_iprange(edited);
        run_to_rest(&h, "range-1", 5).await;

        let status = h.kcp.iprange("range-1").status.unwrap();
        assert_eq!(status.cidr.as_deref(), Some("10.1.0.0/24"));
        assert_eq!(status.state, StatusState::Error);
        assert!(status
            .conditions
            .iter()
            .any(|c| c.reason == reasons::CIDR_CAN_NOT_CHANGE));
    }

    #[tokio::test]
    async fn missing_cidr_without_allocation_is_an_error() {
        let h = harness(IpRangeConfig {
            auto_cidr_allocation: false,
            default_prefix: 24,
        });
        seed_aws_tenant(&h, &[], &["eu-west-1a"]);
        h.kcp.put_iprange(sample_iprange("range-1", None));

        run_to_rest(&h, "range-1", 5).await;

        let status = h.kcp.iprange("range-1").status.unwrap();
        assert_eq!(status.state, StatusState::Error);
        assert!(status
            .conditions
            .iter()
            .any(|c| c.reason == reasons::CIDR_REQUIRED));
    }

    #[tokio::test]
    async fn overlapping_spec_cidr_is_rejected() {
        let h = harness(IpRangeConfig::default());
        seed_aws_tenant(&h, &["10.3.0.0/16"], &["eu-west-1a"]);
        h.kcp
            .put_iprange(sample_iprange("range-1", Some("10.3.5.0/24")));

        run_to_rest(&h, "range-1", 5).await;

        let status = h.kcp.iprange("range-1").status.unwrap();
        assert_eq!(status.state, StatusState::Error);
        assert!(status
            .conditions
            .iter()
            .any(|c| c.reason == reasons::CIDR_OVERLAP));
    }

    #[tokio::test]
    async fn delete_is_blocked_while_used_then_proceeds() {
        let h = harness(IpRangeConfig::default());
        seed_aws_tenant(&h, &[], &["eu-west-1a"]);
        h.kcp
            .put_iprange(sample_iprange("range-1", Some("10.1.0.0/24")));
        run_to_rest(&h, "range-1", 10).await;

        h.kcp.add_user("range-1", "NfsInstance/volume-1");
        let mut deleting = h.kcp.iprange("range-1");
        deleting.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        h.kcp.put_iprange(deleting);

        let obj = Arc::new(h.kcp.iprange("range-1"));
        let action = h.reconciler.reconcile(obj).await.unwrap();
        assert_eq!(action, ReconcileAction::requeue(Duration::from_secs(10)));

        let blocked = h.kcp.iprange("range-1");
        let status = blocked.status.as_ref().unwrap();
        assert_eq!(status.state, StatusState::Warning);
        let warning = status
            .conditions
            .iter()
            .find(|c| c.reason == reasons::DELETE_WHILE_USED)
            .expect("warning condition");
        assert!(warning.message.contains("NfsInstance/volume-1"));
        assert!(blocked
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == KCP_FINALIZER)));

        h.kcp.clear_users();
        run_to_rest(&h, "range-1", 10).await;

        let released = h.kcp.iprange("range-1");
        assert!(released
            .metadata
            .finalizers
            .as_ref()
            .is_none_or(|f| f.is_empty()));
        let vpc_id = released.status.unwrap().vpc_id.unwrap();
        assert!(h.cloud.associations_of(&vpc_id).is_empty());
        assert_eq!(h.cloud.subnet_count("range-1"), 0);
    }

    #[tokio::test]
    async fn steady_state_reconcile_is_idempotent() {
        let h = harness(IpRangeConfig::default());
        seed_aws_tenant(&h, &[], &["eu-west-1a"]);
        h.kcp
            .put_iprange(sample_iprange("range-1", Some("10.1.0.0/24")));
        run_to_rest(&h, "range-1", 10).await;
        let settled = h.kcp.iprange("range-1");

        // a fresh pass over a converged object changes nothing and stops
        let actions = run_to_rest(&h, "range-1", 2).await;
        assert_eq!(actions, vec![ReconcileAction::await_change()]);
        assert_eq!(
            serde_json::to_value(&h.kcp.iprange("range-1")).unwrap(),
            serde_json::to_value(&settled).unwrap()
        );
    }

    #[tokio::test]
    async fn gcp_range_reserves_address_and_joins_psa_connection() {
        let h = harness(IpRangeConfig::default());
        seed_gcp_tenant(&h);
        h.kcp
            .put_iprange(sample_iprange("range-1", Some("10.4.0.0/24")));

        let actions = run_to_rest(&h, "range-1", 15).await;

        // address reservation and connection update each park an operation id
        // and poll it with delayed requeues until it reports done
        let polls = actions
            .iter()
            .filter(|a| **a == ReconcileAction::requeue(Duration::from_secs(10)))
            .count();
        assert!(polls >= 4, "expected operation polling requeues, got {actions:?}");

        let status = h.kcp.iprange("range-1").status.unwrap();
        assert_eq!(status.state, StatusState::Ready);
        assert_eq!(status.ranges, vec!["10.4.0.0/24"]);
        assert_eq!(status.id.as_deref(), Some("range-1"));
        assert!(status.op_identifier.is_none());

        let address = h
            .cloud
            .global_address("proj-a", "range-1")
            .expect("global address reserved");
        assert_eq!(address.cidr, "10.4.0.0/24");
        assert_eq!(
            h.cloud
                .psa_ranges("proj-a", "wire-vpc", "servicenetworking.googleapis.com"),
            vec!["range-1"]
        );
    }

    #[tokio::test]
    async fn gcp_delete_detaches_range_and_releases_address() {
        let h = harness(IpRangeConfig::default());
        seed_gcp_tenant(&h);
        h.kcp
            .put_iprange(sample_iprange("range-1", Some("10.4.0.0/24")));
        run_to_rest(&h, "range-1", 15).await;

        let mut deleting = h.kcp.iprange("range-1");
        deleting.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        h.kcp.put_iprange(deleting);
        run_to_rest(&h, "range-1", 15).await;

        assert!(h
            .cloud
            .psa_ranges("proj-a", "wire-vpc", "servicenetworking.googleapis.com")
            .is_empty());
        assert!(h.cloud.global_address("proj-a", "range-1").is_none());

        let released = h.kcp.iprange("range-1");
        assert!(released
            .metadata
            .finalizers
            .as_ref()
            .is_none_or(|f| f.is_empty()));
        assert_eq!(released.status.unwrap().state, StatusState::Deleting);
    }
}
