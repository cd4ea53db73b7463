//! In-memory provider implementations
//!
//! One `InMemoryCloud` backs every provider trait. Asynchronous provider
//! behavior is simulated by advancing pending associations and operations as
//! they are observed: the first poll reports in-progress, the next reports
//! settled. Used by tests and by deployments running without cloud SDKs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use nimbus_common::Result;

use super::aws::{
    AssociationState, AwsIpRangeClient, CidrAssociation, SubnetInfo, VpcInfo,
};
use super::gcp::{GcpIpRangeClient, GlobalAddress, OperationState};

#[derive(Default)]
struct CloudState {
    vpcs: Vec<VpcRecord>,
    subnets: Vec<SubnetRecord>,
    addresses: HashMap<(String, String), GlobalAddress>,
    connections: HashMap<(String, String, String), Vec<String>>,
    operations: HashMap<String, u32>,
    next_id: u64,
}

struct VpcRecord {
    account_id: String,
    region: String,
    name: String,
    id: String,
    associations: Vec<AssocRecord>,
}

struct AssocRecord {
    id: String,
    cidr: String,
    state: AssociationState,
    polls: u32,
}

struct SubnetRecord {
    vpc_id: String,
    tag: String,
    info: SubnetInfo,
}

/// Shared fake cloud; see module docs
#[derive(Default)]
pub struct InMemoryCloud {
    inner: Mutex<CloudState>,
}

impl InMemoryCloud {
    /// An empty cloud with no VPCs
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CloudState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fresh_id(state: &mut CloudState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}-{:04}", state.next_id)
    }

    /// Seed a VPC for an account/region under the given name tag
    pub fn add_vpc(&self, account_id: &str, region: &str, name: &str) -> String {
        let mut state = self.lock();
        let id = Self::fresh_id(&mut state, "vpc");
        state.vpcs.push(VpcRecord {
            account_id: account_id.to_string(),
            region: region.to_string(),
            name: name.to_string(),
            id: id.clone(),
            associations: Vec::new(),
        });
        id
    }

    /// CIDRs currently associated (in any state) with the given VPC
    pub fn associations_of(&self, vpc_id: &str) -> Vec<String> {
        let state = self.lock();
        state
            .vpcs
            .iter()
            .filter(|v| v.id == vpc_id)
            .flat_map(|v| v.associations.iter().map(|a| a.cidr.clone()))
            .collect()
    }

    /// Number of subnets existing for the given tag
    pub fn subnet_count(&self, tag: &str) -> usize {
        self.lock().subnets.iter().filter(|s| s.tag == tag).count()
    }

    /// Reserved global address, `None` when not reserved
    pub fn global_address(&self, project: &str, name: &str) -> Option<GlobalAddress> {
        self.lock()
            .addresses
            .get(&(project.to_string(), name.to_string()))
            .cloned()
    }

    /// Reservations attached to the service connection, empty when none
    pub fn psa_ranges(&self, project: &str, network: &str, service: &str) -> Vec<String> {
        self.lock()
            .connections
            .get(&(project.to_string(), network.to_string(), service.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AwsIpRangeClient for InMemoryCloud {
    async fn describe_vpc(
        &self,
        account_id: &str,
        region: &str,
        name: &str,
    ) -> Result<Option<VpcInfo>> {
        let mut state = self.lock();
        let Some(vpc) = state
            .vpcs
            .iter_mut()
            .find(|v| v.account_id == account_id && v.region == region && v.name == name)
        else {
            return Ok(None);
        };
        // pending associations settle on the second observation
        for assoc in &mut vpc.associations {
            if assoc.state == AssociationState::Associating {
                assoc.polls += 1;
                if assoc.polls >= 2 {
                    assoc.state = AssociationState::Associated;
                }
            }
        }
        Ok(Some(VpcInfo {
            id: vpc.id.clone(),
            associations: vpc
                .associations
                .iter()
                .map(|a| CidrAssociation {
                    id: a.id.clone(),
                    cidr: a.cidr.clone(),
                    state: a.state,
                })
                .collect(),
        }))
    }

    async fn associate_vpc_cidr(&self, vpc_id: &str, cidr: &str) -> Result<()> {
        let mut state = self.lock();
        let id = Self::fresh_id(&mut state, "assoc");
        if let Some(vpc) = state.vpcs.iter_mut().find(|v| v.id == vpc_id) {
            if vpc.associations.iter().any(|a| a.cidr == cidr) {
                return Ok(());
            }
            vpc.associations.push(AssocRecord {
                id,
                cidr: cidr.to_string(),
                state: AssociationState::Associating,
                polls: 0,
            });
        }
        Ok(())
    }

    async fn disassociate_vpc_cidr(&self, vpc_id: &str, association_id: &str) -> Result<()> {
        let mut state = self.lock();
        if let Some(vpc) = state.vpcs.iter_mut().find(|v| v.id == vpc_id) {
            vpc.associations.retain(|a| a.id != association_id);
        }
        Ok(())
    }

    async fn describe_subnets(&self, vpc_id: &str, tag: &str) -> Result<Vec<SubnetInfo>> {
        let state = self.lock();
        Ok(state
            .subnets
            .iter()
            .filter(|s| s.vpc_id == vpc_id && s.tag == tag)
            .map(|s| s.info.clone())
            .collect())
    }

    async fn create_subnet(
        &self,
        vpc_id: &str,
        zone: &str,
        cidr: &str,
        tag: &str,
    ) -> Result<SubnetInfo> {
        let mut state = self.lock();
        if let Some(existing) = state
            .subnets
            .iter()
            .find(|s| s.vpc_id == vpc_id && s.tag == tag && s.info.zone == zone)
        {
            return Ok(existing.info.clone());
        }
        let id = Self::fresh_id(&mut state, "subnet");
        let info = SubnetInfo {
            id,
            zone: zone.to_string(),
            cidr: cidr.to_string(),
        };
        state.subnets.push(SubnetRecord {
            vpc_id: vpc_id.to_string(),
            tag: tag.to_string(),
            info: info.clone(),
        });
        Ok(info)
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.subnets.retain(|s| s.info.id != subnet_id);
        Ok(())
    }
}

#[async_trait]
impl GcpIpRangeClient for InMemoryCloud {
    async fn get_operation(&self, _project: &str, operation: &str) -> Result<OperationState> {
        let mut state = self.lock();
        let polls = state.operations.entry(operation.to_string()).or_insert(0);
        *polls += 1;
        if *polls >= 2 {
            Ok(OperationState::Done)
        } else {
            Ok(OperationState::InProgress)
        }
    }

    async fn get_global_address(
        &self,
        project: &str,
        name: &str,
    ) -> Result<Option<GlobalAddress>> {
        let state = self.lock();
        Ok(state
            .addresses
            .get(&(project.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_global_address(
        &self,
        project: &str,
        name: &str,
        cidr: &str,
    ) -> Result<String> {
        let mut state = self.lock();
        state.addresses.insert(
            (project.to_string(), name.to_string()),
            GlobalAddress {
                name: name.to_string(),
                cidr: cidr.to_string(),
            },
        );
        Ok(Self::fresh_id(&mut state, "op"))
    }

    async fn delete_global_address(&self, project: &str, name: &str) -> Result<Option<String>> {
        let mut state = self.lock();
        if state
            .addresses
            .remove(&(project.to_string(), name.to_string()))
            .is_some()
        {
            Ok(Some(Self::fresh_id(&mut state, "op")))
        } else {
            Ok(None)
        }
    }

    async fn get_psa_connection(
        &self,
        project: &str,
        network: &str,
        service: &str,
    ) -> Result<Option<Vec<String>>> {
        let state = self.lock();
        Ok(state
            .connections
            .get(&(project.to_string(), network.to_string(), service.to_string()))
            .cloned())
    }

    async fn ensure_psa_connection(
        &self,
        project: &str,
        network: &str,
        service: &str,
        reserved_ranges: &[String],
    ) -> Result<String> {
        let mut state = self.lock();
        state.connections.insert(
            (project.to_string(), network.to_string(), service.to_string()),
            reserved_ranges.to_vec(),
        );
        Ok(Self::fresh_id(&mut state, "op"))
    }

    async fn remove_psa_range(
        &self,
        project: &str,
        network: &str,
        service: &str,
        reserved_range: &str,
    ) -> Result<Option<String>> {
        let mut state = self.lock();
        let key = (project.to_string(), network.to_string(), service.to_string());
        let Some(ranges) = state.connections.get_mut(&key) else {
            return Ok(None);
        };
        if !ranges.iter().any(|r| r == reserved_range) {
            return Ok(None);
        }
        ranges.retain(|r| r != reserved_range);
        if ranges.is_empty() {
            state.connections.remove(&key);
        }
        Ok(Some(Self::fresh_id(&mut state, "op")))
    }
}
