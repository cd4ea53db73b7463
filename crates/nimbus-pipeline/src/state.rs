//! Base object state: the bottom layer of every controller's state chain
//!
//! [`ObjState`] carries the reconciled object, its key, and a narrow
//! [`ObjectOps`] handle to the declarative store. Higher layers wrap it and
//! delegate, so actions written against this layer keep working inside any
//! richer pipeline.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use k8s_openapi::NamespaceResourceScope;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use nimbus_common::{Error, Result};

/// Namespaced identity of a reconciled object
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjKey {
    /// Namespace the object lives in
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjKey {
    /// Create a key
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Narrow store surface the engine needs for one resource type
///
/// Implemented against the Kubernetes API in production and by in-memory
/// fakes in tests. Writes ride on optimistic concurrency; a conflict comes
/// back as a store error the caller turns into an immediate requeue.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectOps<O: Send + Sync + 'static>: Send + Sync {
    /// Fetch the object, `None` when it does not exist
    async fn get(&self, key: &ObjKey) -> Result<Option<O>>;

    /// Persist the object's status subresource
    async fn patch_status(&self, obj: &O) -> Result<()>;

    /// Add a finalizer; returns false without a write when already present
    async fn patch_add_finalizer(&self, obj: &O, finalizer: &str) -> Result<bool>;

    /// Remove a finalizer; returns false without a write when absent
    async fn patch_remove_finalizer(&self, obj: &O, finalizer: &str) -> Result<bool>;
}

/// Base reconciliation state for one object
pub struct ObjState<O: Send + Sync + 'static> {
    ops: Arc<dyn ObjectOps<O>>,
    key: ObjKey,
    obj: Option<O>,
    /// Copy of the object as last read from or written to the store; the
    /// status patch builder diffs against this to suppress no-op writes
    persisted: Option<O>,
}

impl<O: Clone + Send + Sync + 'static> ObjState<O> {
    /// Create state for the given key
    pub fn new(ops: Arc<dyn ObjectOps<O>>, key: ObjKey) -> Self {
        Self {
            ops,
            key,
            obj: None,
            persisted: None,
        }
    }

    /// The object's key
    pub fn key(&self) -> &ObjKey {
        &self.key
    }

    /// Store handle
    pub fn ops(&self) -> &Arc<dyn ObjectOps<O>> {
        &self.ops
    }

    /// The loaded object, if any
    pub fn obj(&self) -> Option<&O> {
        self.obj.as_ref()
    }

    /// Mutable access to the loaded object
    pub fn obj_mut(&mut self) -> Option<&mut O> {
        self.obj.as_mut()
    }

    /// Replace the loaded object (tests and create paths)
    pub fn set_obj(&mut self, obj: O) {
        self.persisted = Some(obj.clone());
        self.obj = Some(obj);
    }

    /// The object as last persisted, if known
    pub fn persisted(&self) -> Option<&O> {
        self.persisted.as_ref()
    }

    /// Record the in-memory object as persisted after a successful write
    pub(crate) fn record_persisted(&mut self) {
        self.persisted = self.obj.clone();
    }

    /// Load the object from the store; returns false when it does not exist
    pub async fn load(&mut self) -> Result<bool> {
        match self.ops.get(&self.key).await? {
            Some(obj) => {
                self.persisted = Some(obj.clone());
                self.obj = Some(obj);
                Ok(true)
            }
            None => {
                self.obj = None;
                self.persisted = None;
                Ok(false)
            }
        }
    }
}

impl<O> ObjState<O>
where
    O: Clone + Serialize + Send + Sync + 'static,
{
    /// Persist the status subresource if it differs from the copy last read
    /// or written; returns whether a write happened
    pub async fn persist_status(&mut self) -> Result<bool> {
        let Some(obj) = self.obj.clone() else {
            return Err(Error::internal("state", "persist_status on unloaded object"));
        };
        if let Some(persisted) = &self.persisted {
            if status_value(&obj) == status_value(persisted) {
                return Ok(false);
            }
        }
        self.ops.patch_status(&obj).await?;
        self.persisted = Some(obj);
        Ok(true)
    }
}

/// The serialized `status` field of an object, used for change detection
pub(crate) fn status_value<O: Serialize>(obj: &O) -> Option<serde_json::Value> {
    serde_json::to_value(obj)
        .ok()
        .and_then(|v| v.get("status").cloned())
}

impl<O: Clone + Resource + Send + Sync + 'static> ObjState<O> {
    /// Whether the object is marked for deletion (deletion timestamp set)
    pub fn marked_for_deletion(&self) -> bool {
        self.obj
            .as_ref()
            .is_some_and(|o| o.meta().deletion_timestamp.is_some())
    }

    /// Whether the object carries the given finalizer
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.obj
            .as_ref()
            .is_some_and(|o| o.finalizers().iter().any(|f| f == finalizer))
    }
}

/// Production [`ObjectOps`] backed by the Kubernetes API
///
/// Status writes use a merge patch against the status subresource; finalizer
/// updates patch the full finalizer list, which is equivalent under merge
/// semantics and keeps the write idempotent.
pub struct KubeOps<O> {
    client: Client,
    _marker: PhantomData<O>,
}

impl<O> KubeOps<O> {
    /// Create ops over the given client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _marker: PhantomData,
        }
    }
}

impl<O> KubeOps<O>
where
    O: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + fmt::Debug,
    O::DynamicType: Default,
{
    fn api(&self, namespace: &str) -> Api<O> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<O> ObjectOps<O> for KubeOps<O>
where
    O: Resource<Scope = NamespaceResourceScope>
        + Clone
        + Serialize
        + DeserializeOwned
        + fmt::Debug
        + Send
        + Sync
        + 'static,
    O::DynamicType: Default,
{
    async fn get(&self, key: &ObjKey) -> Result<Option<O>> {
        Ok(self.api(&key.namespace).get_opt(&key.name).await?)
    }

    async fn patch_status(&self, obj: &O) -> Result<()> {
        let namespace = obj.namespace().ok_or_else(|| {
            Error::internal("state", "object without namespace in patch_status")
        })?;
        let value = serde_json::to_value(obj)
            .map_err(|e| Error::serialization(format!("serializing status: {e}")))?;
        let status = value.get("status").cloned().ok_or_else(|| {
            Error::serialization(format!("status not found on {}", obj.name_any()))
        })?;
        self.api(&namespace)
            .patch_status(
                &obj.name_any(),
                &PatchParams::default(),
                &Patch::Merge(serde_json::json!({ "status": status })),
            )
            .await?;
        Ok(())
    }

    async fn patch_add_finalizer(&self, obj: &O, finalizer: &str) -> Result<bool> {
        if obj.finalizers().iter().any(|f| f == finalizer) {
            return Ok(false);
        }
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::internal("state", "object without namespace in finalizer patch"))?;
        let mut finalizers = obj.finalizers().to_vec();
        finalizers.push(finalizer.to_string());
        self.api(&namespace)
            .patch(
                &obj.name_any(),
                &PatchParams::default(),
                &Patch::Merge(serde_json::json!({ "metadata": { "finalizers": finalizers } })),
            )
            .await?;
        Ok(true)
    }

    async fn patch_remove_finalizer(&self, obj: &O, finalizer: &str) -> Result<bool> {
        if !obj.finalizers().iter().any(|f| f == finalizer) {
            return Ok(false);
        }
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::internal("state", "object without namespace in finalizer patch"))?;
        let finalizers: Vec<_> = obj
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != finalizer)
            .cloned()
            .collect();
        self.api(&namespace)
            .patch(
                &obj.name_any(),
                &PatchParams::default(),
                &Patch::Merge(serde_json::json!({ "metadata": { "finalizers": finalizers } })),
            )
            .await?;
        Ok(true)
    }
}
