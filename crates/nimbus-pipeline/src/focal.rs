//! Focal state: base state plus the resolved owning Scope
//!
//! Most control-plane actions need to know which cloud account and region
//! they operate against. [`FocalState`] wraps [`ObjState`] and resolves the
//! [`Scope`] referenced by the reconciled object, by name first and by tenant
//! label as a fallback. Controller state types wrap this layer and delegate
//! through [`Deref`].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use async_trait::async_trait;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use tracing::warn;

use nimbus_common::crd::control::Scope;
use nimbus_common::crd::ProviderType;
use nimbus_common::{Result, LABEL_SCOPE_TENANT};

use crate::state::{ObjKey, ObjState, ObjectOps};

/// Read access to Scopes, kept separate from [`ObjectOps`] so controller
/// tests can fake Scope lookup independently of the reconciled object
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScopeOps: Send + Sync {
    /// Fetch a Scope by name, `None` when it does not exist
    async fn get_scope(&self, namespace: &str, name: &str) -> Result<Option<Scope>>;

    /// List Scopes labeled with the given tenant identity
    async fn list_scopes_by_tenant(&self, namespace: &str, tenant: &str) -> Result<Vec<Scope>>;
}

/// Production [`ScopeOps`] backed by the Kubernetes API
pub struct KubeScopeOps {
    client: Client,
}

impl KubeScopeOps {
    /// Create ops over the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ScopeOps for KubeScopeOps {
    async fn get_scope(&self, namespace: &str, name: &str) -> Result<Option<Scope>> {
        let api: Api<Scope> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_scopes_by_tenant(&self, namespace: &str, tenant: &str) -> Result<Vec<Scope>> {
        let api: Api<Scope> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&format!("{LABEL_SCOPE_TENANT}={tenant}"));
        Ok(api.list(&params).await?.items)
    }
}

/// Pick one Scope from a labeled set, deterministically
///
/// An exact name match on the tenant identity wins. Otherwise the list is
/// ordered by name and the first entry is taken, so repeated reconciles of a
/// mislabeled cluster at least converge on the same Scope.
pub fn pick_scope(mut scopes: Vec<Scope>, tenant: &str) -> Option<Scope> {
    if scopes.is_empty() {
        return None;
    }
    if let Some(pos) = scopes.iter().position(|s| s.name_any() == tenant) {
        return Some(scopes.swap_remove(pos));
    }
    scopes.sort_by_key(|s| s.name_any());
    if scopes.len() > 1 {
        warn!(
            tenant = %tenant,
            count = scopes.len(),
            picked = %scopes[0].name_any(),
            "multiple scopes labeled for tenant, picking first by name"
        );
    }
    Some(scopes.swap_remove(0))
}

/// Base state plus the resolved Scope
pub struct FocalState<O: Send + Sync + 'static> {
    base: ObjState<O>,
    scope_ops: Arc<dyn ScopeOps>,
    scope: Option<Scope>,
}

impl<O: Clone + Send + Sync + 'static> FocalState<O> {
    /// Create focal state over the given stores
    pub fn new(ops: Arc<dyn ObjectOps<O>>, scope_ops: Arc<dyn ScopeOps>, key: ObjKey) -> Self {
        Self {
            base: ObjState::new(ops, key),
            scope_ops,
            scope: None,
        }
    }

    /// The resolved Scope, if loaded
    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    /// Replace the resolved Scope (tests)
    pub fn set_scope(&mut self, scope: Scope) {
        self.scope = Some(scope);
    }

    /// Provider of the resolved Scope
    pub fn provider(&self) -> Option<ProviderType> {
        self.scope.as_ref().map(|s| s.spec.provider)
    }

    /// Resolve the Scope named by the reconciled object
    ///
    /// Looks up `scope_name` in the object's namespace; when absent, falls
    /// back to the tenant label and [`pick_scope`]. Returns false when no
    /// Scope was found either way.
    pub async fn load_scope(&mut self, scope_name: &str) -> Result<bool> {
        let namespace = self.base.key().namespace.clone();
        if let Some(scope) = self.scope_ops.get_scope(&namespace, scope_name).await? {
            self.scope = Some(scope);
            return Ok(true);
        }
        let labeled = self
            .scope_ops
            .list_scopes_by_tenant(&namespace, scope_name)
            .await?;
        match pick_scope(labeled, scope_name) {
            Some(scope) => {
                self.scope = Some(scope);
                Ok(true)
            }
            None => {
                self.scope = None;
                Ok(false)
            }
        }
    }
}

impl<O: Send + Sync + 'static> Deref for FocalState<O> {
    type Target = ObjState<O>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<O: Send + Sync + 'static> DerefMut for FocalState<O> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

/// Capability trait for states that carry a resolved Scope, letting provider
/// dispatch predicates work over any controller's state type
pub trait HasScope {
    /// The resolved Scope, if any
    fn scope(&self) -> Option<&Scope>;

    /// Provider of the resolved Scope
    fn provider(&self) -> Option<ProviderType> {
        self.scope().map(|s| s.spec.provider)
    }
}

impl<O: Send + Sync + 'static> HasScope for FocalState<O> {
    fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }
}

/// Predicate: the resolved Scope uses the given provider
pub fn provider_is<S: HasScope>(
    provider: ProviderType,
) -> impl Fn(&S) -> bool + Send + Sync + 'static {
    move |state: &S| state.provider() == Some(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_common::crd::control::{AwsScope, ScopeInfo, ScopeSpec};

    fn sample_scope(name: &str, tenant: &str) -> Scope {
        let mut scope = Scope::new(
            name,
            ScopeSpec::new(
                tenant,
                "eu-west-1",
                ScopeInfo::Aws(AwsScope {
                    account_id: "1234".into(),
                    vpc_network_name: format!("{tenant}--vpc"),
                }),
            ),
        );
        scope.metadata.namespace = Some("kcp-system".into());
        scope
    }

    mod pick_scope {
        use super::*;

        #[test]
        fn exact_name_match_wins() {
            let scopes = vec![
                sample_scope("aaa-first", "tenant-a"),
                sample_scope("tenant-a", "tenant-a"),
            ];
            let picked = pick_scope(scopes, "tenant-a").unwrap();
            assert_eq!(picked.name_any(), "tenant-a");
        }

        #[test]
        fn falls_back_to_first_by_name() {
            let scopes = vec![
                sample_scope("zzz-scope", "tenant-a"),
                sample_scope("bbb-scope", "tenant-a"),
                sample_scope("mmm-scope", "tenant-a"),
            ];
            let picked = pick_scope(scopes, "tenant-a").unwrap();
            assert_eq!(picked.name_any(), "bbb-scope");
        }

        #[test]
        fn empty_list_yields_none() {
            assert!(pick_scope(Vec::new(), "tenant-a").is_none());
        }
    }

    mod load_scope {
        use super::*;
        use crate::state::MockObjectOps;

        type Obj = Scope;

        fn state_with(scope_ops: MockScopeOps) -> FocalState<Obj> {
            let mut ops = MockObjectOps::<Obj>::new();
            ops.expect_get().never();
            FocalState::new(
                Arc::new(ops),
                Arc::new(scope_ops),
                ObjKey::new("kcp-system", "range-1"),
            )
        }

        #[tokio::test]
        async fn by_name_lookup_wins() {
            let mut scope_ops = MockScopeOps::new();
            scope_ops
                .expect_get_scope()
                .returning(|_, name| Ok(Some(sample_scope(name, "tenant-a"))));
            scope_ops.expect_list_scopes_by_tenant().never();

            let mut state = state_with(scope_ops);
            assert!(state.load_scope("tenant-a").await.unwrap());
            assert_eq!(state.provider(), Some(ProviderType::Aws));
        }

        #[tokio::test]
        async fn falls_back_to_tenant_label() {
            let mut scope_ops = MockScopeOps::new();
            scope_ops.expect_get_scope().returning(|_, _| Ok(None));
            scope_ops
                .expect_list_scopes_by_tenant()
                .returning(|_, tenant| Ok(vec![sample_scope("relabeled", tenant)]));

            let mut state = state_with(scope_ops);
            assert!(state.load_scope("tenant-a").await.unwrap());
            assert_eq!(state.scope().unwrap().name_any(), "relabeled");
        }

        #[tokio::test]
        async fn missing_scope_reports_false() {
            let mut scope_ops = MockScopeOps::new();
            scope_ops.expect_get_scope().returning(|_, _| Ok(None));
            scope_ops
                .expect_list_scopes_by_tenant()
                .returning(|_, _| Ok(Vec::new()));

            let mut state = state_with(scope_ops);
            assert!(!state.load_scope("tenant-a").await.unwrap());
            assert!(state.scope().is_none());
        }
    }

    #[test]
    fn provider_predicate_dispatches_on_scope() {
        let mut ops = MockScopeOps::new();
        ops.expect_get_scope().never();
        let mut state: FocalState<Scope> = FocalState::new(
            Arc::new(crate::state::MockObjectOps::<Scope>::new()),
            Arc::new(ops),
            ObjKey::new("kcp-system", "x"),
        );
        assert!(!provider_is(ProviderType::Aws)(&state));
        state.set_scope(sample_scope("tenant-a", "tenant-a"));
        assert!(provider_is(ProviderType::Aws)(&state));
        assert!(!provider_is(ProviderType::Gcp)(&state));
    }
}
