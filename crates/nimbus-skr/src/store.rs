//! Access to control-plane mirrors of tenant IpRanges
//!
//! Mirrors are linked to their tenant origin by a label triple (tenant,
//! remote name, remote namespace), never by a name stored on either side.
//! Lookup is always a labeled list, so a renamed or recreated mirror is still
//! found.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};

use nimbus_common::crd::control::IpRange as KcpIpRange;
use nimbus_common::crd::types::RemoteRef;
use nimbus_common::{Result, LABEL_REMOTE_NAME, LABEL_REMOTE_NAMESPACE, LABEL_TENANT};

/// Read/write access to control-plane IpRange mirrors
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// List mirrors carrying the link labels for the given tenant origin
    async fn list_mirrors(&self, tenant: &str, remote: &RemoteRef) -> Result<Vec<KcpIpRange>>;

    /// Create a mirror; succeeding creates of the same name are no-ops
    async fn create_mirror(&self, mirror: &KcpIpRange) -> Result<()>;

    /// Delete a mirror; absent mirrors are treated as already deleted
    async fn delete_mirror(&self, name: &str) -> Result<()>;
}

/// Production [`MirrorStore`] over the control-plane cluster
pub struct KubeMirrorStore {
    client: Client,
    namespace: String,
}

impl KubeMirrorStore {
    /// Store over the given control-plane client and namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api(&self) -> Api<KcpIpRange> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl MirrorStore for KubeMirrorStore {
    async fn list_mirrors(&self, tenant: &str, remote: &RemoteRef) -> Result<Vec<KcpIpRange>> {
        let selector = format!(
            "{LABEL_TENANT}={tenant},{LABEL_REMOTE_NAME}={},{LABEL_REMOTE_NAMESPACE}={}",
            remote.name, remote.namespace
        );
        let params = ListParams::default().labels(&selector);
        Ok(self.api().list(&params).await?.items)
    }

    async fn create_mirror(&self, mirror: &KcpIpRange) -> Result<()> {
        match self.api().create(&PostParams::default(), mirror).await {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = nimbus_common::Error::from(err);
                if err.is_already_exists() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn delete_mirror(&self, name: &str) -> Result<()> {
        match self.api().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = nimbus_common::Error::from(err);
                if err.is_not_found() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }
}
