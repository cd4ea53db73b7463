//! Store traits for the dependents of an IpRange
//!
//! Narrow per-concern traits keep the pipeline testable without an API
//! server. Creates tolerate already-exists and deletes tolerate not-found, so
//! restarted reconciles converge instead of failing.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, ResourceExt};

use nimbus_common::crd::control::{IpRange, Network, NfsInstance, RedisCluster, RedisInstance, VpcPeering};
use nimbus_common::Result;

/// Read/write access to Networks
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NetworkStore: Send + Sync {
    /// Fetch a Network by name, `None` when it does not exist
    async fn get_network(&self, namespace: &str, name: &str) -> Result<Option<Network>>;

    /// Create a Network; succeeding creates of the same name are no-ops
    async fn create_network(&self, network: &Network) -> Result<()>;

    /// Delete a Network; absent networks are treated as already deleted
    async fn delete_network(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Read/write access to VpcPeerings
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PeeringStore: Send + Sync {
    /// Fetch a VpcPeering by name, `None` when it does not exist
    async fn get_peering(&self, namespace: &str, name: &str) -> Result<Option<VpcPeering>>;

    /// Create a VpcPeering; succeeding creates of the same name are no-ops
    async fn create_peering(&self, peering: &VpcPeering) -> Result<()>;

    /// Delete a VpcPeering; absent peerings are treated as already deleted
    async fn delete_peering(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Lookup of resources that place endpoints inside an IpRange
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Names of resources referencing the given IpRange, prefixed by kind
    async fn users_of(&self, namespace: &str, iprange_name: &str) -> Result<Vec<String>>;
}

/// Lookup of sibling IpRanges for overlap checks
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SiblingStore: Send + Sync {
    /// Effective CIDRs of all other IpRanges in the same Scope
    async fn sibling_cidrs(
        &self,
        namespace: &str,
        scope_name: &str,
        exclude_name: &str,
    ) -> Result<Vec<String>>;
}

/// Production stores backed by the Kubernetes API
pub struct KubeStores {
    client: Client,
}

impl KubeStores {
    /// Create stores over the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NetworkStore for KubeStores {
    async fn get_network(&self, namespace: &str, name: &str) -> Result<Option<Network>> {
        let api: Api<Network> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_network(&self, network: &Network) -> Result<()> {
        let namespace = network.namespace().unwrap_or_default();
        let api: Api<Network> = Api::namespaced(self.client.clone(), &namespace);
        match api.create(&PostParams::default(), network).await {
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

    async fn delete_network(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Network> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
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

#[async_trait]
impl PeeringStore for KubeStores {
    async fn get_peering(&self, namespace: &str, name: &str) -> Result<Option<VpcPeering>> {
        let api: Api<VpcPeering> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_peering(&self, peering: &VpcPeering) -> Result<()> {
        let namespace = peering.namespace().unwrap_or_default();
        let api: Api<VpcPeering> = Api::namespaced(self.client.clone(), &namespace);
        match api.create(&PostParams::default(), peering).await {
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

    async fn delete_peering(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<VpcPeering> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
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

#[async_trait]
impl UsageStore for KubeStores {
    async fn users_of(&self, namespace: &str, iprange_name: &str) -> Result<Vec<String>> {
        let mut users = Vec::new();

        let nfs: Api<NfsInstance> = Api::namespaced(self.client.clone(), namespace);
        for item in nfs.list(&ListParams::default()).await?.items {
            if item.spec.ip_range.name == iprange_name {
                users.push(format!("NfsInstance/{}", item.name_any()));
            }
        }

        let redis: Api<RedisInstance> = Api::namespaced(self.client.clone(), namespace);
        for item in redis.list(&ListParams::default()).await?.items {
            if item.spec.ip_range.name == iprange_name {
                users.push(format!("RedisInstance/{}", item.name_any()));
            }
        }

        let clusters: Api<RedisCluster> = Api::namespaced(self.client.clone(), namespace);
        for item in clusters.list(&ListParams::default()).await?.items {
            if item.spec.ip_range.name == iprange_name {
                users.push(format!("RedisCluster/{}", item.name_any()));
            }
        }

        users.sort();
        Ok(users)
    }
}

#[async_trait]
impl SiblingStore for KubeStores {
    async fn sibling_cidrs(
        &self,
        namespace: &str,
        scope_name: &str,
        exclude_name: &str,
    ) -> Result<Vec<String>> {
        let api: Api<IpRange> = Api::namespaced(self.client.clone(), namespace);
        let mut cidrs = Vec::new();
        for item in api.list(&ListParams::default()).await?.items {
            if item.name_any() == exclude_name || item.spec.scope.name != scope_name {
                continue;
            }
            if let Some(cidr) = item.effective_cidr() {
                cidrs.push(cidr.to_string());
            }
        }
        Ok(cidrs)
    }
}
