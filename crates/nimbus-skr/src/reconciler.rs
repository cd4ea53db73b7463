//! Tenant IpRange reconciler: pipeline assembly and the controller entry
//! points

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action as ReconcileAction;
use kube::{Client, ResourceExt};
use tracing::{error, info, warn};

use nimbus_common::crd::tenant::IpRange;
use nimbus_common::Error;
use nimbus_pipeline::{case, handle, switch, Action, DynAction, KubeOps, ObjKey, ObjectOps, Pipeline};

use crate::actions::{
    AddFinalizer, CopyMirrorStatus, CreateMirror, DeleteMirror, LoadMirror, MarkDeleting,
    RemoveFinalizer, RequireFinalizer, WaitMirror,
};
use crate::state::MirrorState;
use crate::store::{KubeMirrorStore, MirrorStore};

fn provisioning_pipeline() -> Pipeline<MirrorState> {
    Pipeline::named("skrIpRangeProvision")
        .step(AddFinalizer)
        .step(CreateMirror)
        .step(WaitMirror)
        .step(CopyMirrorStatus)
}

fn deletion_pipeline() -> Pipeline<MirrorState> {
    Pipeline::named("skrIpRangeDelete")
        .step(RequireFinalizer)
        .step(MarkDeleting)
        .step(DeleteMirror)
        .step(RemoveFinalizer)
}

fn main_pipeline() -> Pipeline<MirrorState> {
    Pipeline::named("skrIpRangeMain").step(LoadMirror).step(switch(
        "skrIpRangeLifecycle",
        Some(Arc::new(provisioning_pipeline()) as DynAction<MirrorState>),
        vec![case(
            |s: &MirrorState| s.marked_for_deletion(),
            deletion_pipeline(),
        )],
    ))
}

/// Reconciles tenant IpRanges against their control-plane mirrors
pub struct SkrIpRangeReconciler {
    ops: Arc<dyn ObjectOps<IpRange>>,
    mirrors: Arc<dyn MirrorStore>,
    tenant: String,
    kcp_namespace: String,
}

impl SkrIpRangeReconciler {
    /// Reconciler over the tenant and control-plane Kubernetes APIs
    pub fn new(
        skr_client: Client,
        kcp_client: Client,
        tenant: impl Into<String>,
        kcp_namespace: impl Into<String>,
    ) -> Self {
        let kcp_namespace = kcp_namespace.into();
        Self {
            ops: Arc::new(KubeOps::new(skr_client)),
            mirrors: Arc::new(KubeMirrorStore::new(kcp_client, kcp_namespace.clone())),
            tenant: tenant.into(),
            kcp_namespace,
        }
    }

    /// Reconciler over explicit stores, for tests and SDK-less wiring
    pub fn with_stores(
        ops: Arc<dyn ObjectOps<IpRange>>,
        mirrors: Arc<dyn MirrorStore>,
        tenant: impl Into<String>,
        kcp_namespace: impl Into<String>,
    ) -> Self {
        Self {
            ops,
            mirrors,
            tenant: tenant.into(),
            kcp_namespace: kcp_namespace.into(),
        }
    }

    fn state_for(&self, key: ObjKey) -> MirrorState {
        MirrorState::new(
            self.ops.clone(),
            self.mirrors.clone(),
            self.tenant.clone(),
            self.kcp_namespace.clone(),
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

    use nimbus_common::crd::control::{
        IpRange as KcpIpRange, IpRangeStatus as KcpIpRangeStatus,
    };
    use nimbus_common::crd::tenant::IpRangeSpec;
    use nimbus_common::crd::types::{
        condition_types, reasons, Condition, RemoteRef, StatusState,
    };
    use nimbus_common::{
        Result, LABEL_REMOTE_NAME, LABEL_REMOTE_NAMESPACE, LABEL_TENANT, SKR_FINALIZER,
    };

    use crate::actions::WAIT_DELAY;

    /// Both stores over shared maps: the tenant cluster and the control plane
    #[derive(Default)]
    struct FakeStores {
        tenants: Mutex<HashMap<String, IpRange>>,
        mirrors: Mutex<HashMap<String, KcpIpRange>>,
    }

    impl FakeStores {
        fn put_tenant(&self, obj: IpRange) {
            self.tenants.lock().unwrap().insert(obj.name_any(), obj);
        }

        fn tenant(&self, name: &str) -> IpRange {
            self.tenants.lock().unwrap().get(name).cloned().unwrap()
        }

        fn put_mirror(&self, obj: KcpIpRange) {
            self.mirrors.lock().unwrap().insert(obj.name_any(), obj);
        }

        fn mirror_names(&self) -> Vec<String> {
            let mut names: Vec<_> = self.mirrors.lock().unwrap().keys().cloned().collect();
            names.sort();
            names
        }

        fn single_mirror(&self) -> KcpIpRange {
            let map = self.mirrors.lock().unwrap();
            assert_eq!(map.len(), 1, "expected exactly one mirror");
            map.values().next().cloned().unwrap()
        }

        /// Simulates the control-plane controller converging every mirror
        fn settle_mirrors(&self, cidr: &str, ranges: &[&str]) {
            for mirror in self.mirrors.lock().unwrap().values_mut() {
                mirror.status = Some(KcpIpRangeStatus {
                    state: StatusState::Ready,
                    cidr: Some(cidr.to_string()),
                    ranges: ranges.iter().map(|r| r.to_string()).collect(),
                    conditions: vec![Condition::ready()],
                    ..Default::default()
                });
            }
        }

        fn fail_mirrors(&self, reason: &str, message: &str) {
            for mirror in self.mirrors.lock().unwrap().values_mut() {
                mirror.status = Some(KcpIpRangeStatus {
                    state: StatusState::Error,
                    conditions: vec![Condition::error(reason, message)],
                    ..Default::default()
                });
            }
        }
    }

    #[async_trait]
    impl ObjectOps<IpRange> for FakeStores {
        async fn get(&self, key: &ObjKey) -> Result<Option<IpRange>> {
            Ok(self.tenants.lock().unwrap().get(&key.name).cloned())
        }

        async fn patch_status(&self, obj: &IpRange) -> Result<()> {
            let mut map = self.tenants.lock().unwrap();
            if let Some(stored) = map.get_mut(&obj.name_any()) {
                stored.status = obj.status.clone();
            }
            Ok(())
        }

        async fn patch_add_finalizer(&self, obj: &IpRange, finalizer: &str) -> Result<bool> {
            let mut map = self.tenants.lock().unwrap();
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
            let mut map = self.tenants.lock().unwrap();
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
    impl MirrorStore for FakeStores {
        async fn list_mirrors(
            &self,
            tenant: &str,
            remote: &RemoteRef,
        ) -> Result<Vec<KcpIpRange>> {
            Ok(self
                .mirrors
                .lock()
                .unwrap()
                .values()
                .filter(|m| {
                    m.labels().get(LABEL_TENANT).map(String::as_str) == Some(tenant)
                        && m.labels().get(LABEL_REMOTE_NAME).map(String::as_str)
                            == Some(remote.name.as_str())
                        && m.labels().get(LABEL_REMOTE_NAMESPACE).map(String::as_str)
                            == Some(remote.namespace.as_str())
                })
                .cloned()
                .collect())
        }

        async fn create_mirror(&self, mirror: &KcpIpRange) -> Result<()> {
            self.mirrors
                .lock()
                .unwrap()
                .entry(mirror.name_any())
                .or_insert_with(|| mirror.clone());
            Ok(())
        }

        async fn delete_mirror(&self, name: &str) -> Result<()> {
            self.mirrors.lock().unwrap().remove(name);
            Ok(())
        }
    }

    fn sample_tenant_iprange(name: &str, cidr: Option<&str>) -> IpRange {
        IpRange {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("default".into()),
                ..Default::default()
            },
            spec: IpRangeSpec {
                cidr: cidr.map(str::to_string),
            },
            status: None,
        }
    }

    fn linked_mirror(name: &str, remote_name: &str) -> KcpIpRange {
        use nimbus_common::crd::control::IpRangeSpec as KcpIpRangeSpec;
        use nimbus_common::crd::types::ScopeRef;
        let mut mirror = KcpIpRange::new(
            name,
            KcpIpRangeSpec {
                remote_ref: RemoteRef {
                    namespace: "default".into(),
                    name: remote_name.into(),
                },
                scope: ScopeRef {
                    name: "tenant-a".into(),
                },
                cidr: None,
                network: None,
                options: None,
            },
        );
        mirror.metadata.namespace = Some("kcp-system".into());
        mirror.metadata.labels = Some(
            [
                (LABEL_TENANT.to_string(), "tenant-a".to_string()),
                (LABEL_REMOTE_NAME.to_string(), remote_name.to_string()),
                (LABEL_REMOTE_NAMESPACE.to_string(), "default".to_string()),
            ]
            .into(),
        );
        mirror
    }

    fn harness() -> (Arc<FakeStores>, SkrIpRangeReconciler) {
        let stores = Arc::new(FakeStores::default());
        let reconciler = SkrIpRangeReconciler::with_stores(
            stores.clone(),
            stores.clone(),
            "tenant-a",
            "kcp-system",
        );
        (stores, reconciler)
    }

    async fn run_to_rest(
        stores: &Arc<FakeStores>,
        reconciler: &SkrIpRangeReconciler,
        name: &str,
        max: usize,
    ) -> Vec<ReconcileAction> {
        let mut actions = Vec::new();
        for _ in 0..max {
            let obj = Arc::new(stores.tenant(name));
            let action = reconciler.reconcile(obj).await.unwrap();
            let done = action == ReconcileAction::await_change();
            actions.push(action);
            if done {
                return actions;
            }
        }
        panic!("did not settle within {max} reconciles: {actions:?}");
    }

    #[tokio::test]
    async fn creates_mirror_with_link_labels() {
        let (stores, reconciler) = harness();
        stores.put_tenant(sample_tenant_iprange("range-1", Some("10.1.0.0/24")));

        let obj = Arc::new(stores.tenant("range-1"));
        let action = reconciler.reconcile(obj).await.unwrap();
        assert_eq!(action, ReconcileAction::requeue(WAIT_DELAY));

        let mirror = stores.single_mirror();
        let labels = mirror.labels();
        assert_eq!(labels.get(LABEL_TENANT).map(String::as_str), Some("tenant-a"));
        assert_eq!(
            labels.get(LABEL_REMOTE_NAME).map(String::as_str),
            Some("range-1")
        );
        assert_eq!(
            labels.get(LABEL_REMOTE_NAMESPACE).map(String::as_str),
            Some("default")
        );
        assert_eq!(mirror.spec.remote_ref.to_string(), "default/range-1");
        assert_eq!(mirror.spec.scope.name, "tenant-a");
        assert_eq!(mirror.spec.cidr.as_deref(), Some("10.1.0.0/24"));
        assert_eq!(mirror.namespace().as_deref(), Some("kcp-system"));

        let tenant = stores.tenant("range-1");
        assert!(tenant
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == SKR_FINALIZER)));
        assert_eq!(tenant.status.unwrap().state, StatusState::Processing);
    }

    #[tokio::test]
    async fn copies_allocation_back_when_mirror_ready() {
        let (stores, reconciler) = harness();
        stores.put_tenant(sample_tenant_iprange("range-1", None));

        let obj = Arc::new(stores.tenant("range-1"));
        reconciler.reconcile(obj).await.unwrap();
        stores.settle_mirrors("10.2.0.0/24", &["10.2.0.0/25", "10.2.0.128/25"]);

        run_to_rest(&stores, &reconciler, "range-1", 5).await;

        let status = stores.tenant("range-1").status.unwrap();
        assert_eq!(status.state, StatusState::Ready);
        assert_eq!(status.cidr.as_deref(), Some("10.2.0.0/24"));
        assert_eq!(status.ranges, vec!["10.2.0.0/25", "10.2.0.128/25"]);
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].type_, condition_types::READY);
    }

    #[tokio::test]
    async fn mirror_error_is_copied_to_tenant() {
        let (stores, reconciler) = harness();
        stores.put_tenant(sample_tenant_iprange("range-1", Some("10.3.5.0/24")));

        let obj = Arc::new(stores.tenant("range-1"));
        reconciler.reconcile(obj).await.unwrap();
        stores.fail_mirrors(reasons::CIDR_OVERLAP, "cidr overlaps 10.3.0.0/16");

        run_to_rest(&stores, &reconciler, "range-1", 5).await;

        let status = stores.tenant("range-1").status.unwrap();
        assert_eq!(status.state, StatusState::Error);
        let condition = status
            .conditions
            .iter()
            .find(|c| c.type_ == condition_types::ERROR)
            .expect("error condition");
        assert_eq!(condition.reason, reasons::CIDR_OVERLAP);
        assert!(condition.message.contains("10.3.0.0/16"));
    }

    #[tokio::test]
    async fn duplicate_mirrors_resolve_to_first_by_name() {
        let (stores, reconciler) = harness();
        stores.put_tenant(sample_tenant_iprange("range-1", None));

        let mut first = linked_mirror("aaa-mirror", "range-1");
        first.status = Some(KcpIpRangeStatus {
            state: StatusState::Ready,
            cidr: Some("10.4.0.0/24".into()),
            conditions: vec![Condition::ready()],
            ..Default::default()
        });
        let mut second = linked_mirror("zzz-mirror", "range-1");
        second.status = Some(KcpIpRangeStatus {
            state: StatusState::Ready,
            cidr: Some("10.5.0.0/24".into()),
            conditions: vec![Condition::ready()],
            ..Default::default()
        });
        stores.put_mirror(first);
        stores.put_mirror(second);

        run_to_rest(&stores, &reconciler, "range-1", 5).await;

        // no third mirror is created, and the copy comes from the first pick
        assert_eq!(stores.mirror_names(), vec!["aaa-mirror", "zzz-mirror"]);
        let status = stores.tenant("range-1").status.unwrap();
        assert_eq!(status.cidr.as_deref(), Some("10.4.0.0/24"));
    }

    #[tokio::test]
    async fn found_mirror_is_kept_on_state() {
        let stores = Arc::new(FakeStores::default());
        stores.put_mirror(linked_mirror("aaa-mirror", "range-1"));

        let mut state = MirrorState::new(
            stores.clone(),
            stores.clone(),
            "tenant-a",
            "kcp-system",
            ObjKey::new("default", "range-1"),
        );
        let flow = LoadMirror.run(&mut state).await;
        assert!(flow.is_none());
        assert_eq!(
            state.mirror().map(|m| m.name_any()).as_deref(),
            Some("aaa-mirror")
        );
    }

    #[tokio::test]
    async fn delete_removes_mirror_and_releases_finalizer() {
        let (stores, reconciler) = harness();
        stores.put_tenant(sample_tenant_iprange("range-1", None));

        let obj = Arc::new(stores.tenant("range-1"));
        reconciler.reconcile(obj).await.unwrap();
        stores.settle_mirrors("10.2.0.0/24", &[]);
        run_to_rest(&stores, &reconciler, "range-1", 5).await;

        let mut deleting = stores.tenant("range-1");
        deleting.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        stores.put_tenant(deleting);

        run_to_rest(&stores, &reconciler, "range-1", 5).await;

        assert!(stores.mirror_names().is_empty());
        let released = stores.tenant("range-1");
        assert!(released
            .metadata
            .finalizers
            .as_ref()
            .is_none_or(|f| f.is_empty()));
        assert_eq!(released.status.unwrap().state, StatusState::Deleting);
    }
}
