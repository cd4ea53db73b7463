//! Scope CRD: binds a tenant cluster to a cloud account, region, and the
//! network topology snapshot controllers allocate against.
//!
//! A Scope is immutable once created; there is exactly one per tenant.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::types::{impl_obj_with_conditions, Condition, ProviderType, StatusState};
use crate::{Error, Result};

/// Scope binds a tenant to a cloud provider account and region.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cloud-control.nimbus.dev",
    version = "v1beta1",
    kind = "Scope",
    namespaced,
    status = "ScopeStatus",
    printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".spec.provider"}"#,
    printcolumn = r#"{"name":"Region","type":"string","jsonPath":".spec.region"}"#,
    printcolumn = r#"{"name":"Tenant","type":"string","jsonPath":".spec.tenant"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSpec {
    /// Tenant cluster identity this Scope belongs to
    pub tenant: String,

    /// Cloud provider type; must match the scopeInfo variant
    pub provider: ProviderType,

    /// Provider region
    pub region: String,

    /// Availability zones of the region the tenant is deployed in
    #[serde(default)]
    pub zones: Vec<String>,

    /// CIDR ranges already in use in the tenant's network topology
    /// (nodes, pods, services); new allocations must not overlap these
    #[serde(default)]
    pub existing_cidr_ranges: Vec<String>,

    /// Provider-specific account binding; exactly one variant is set
    pub scope_info: ScopeInfo,
}

/// Provider-specific Scope data; the enum enforces the exactly-one invariant
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ScopeInfo {
    /// AWS account binding
    Aws(AwsScope),
    /// Azure subscription binding
    Azure(AzureScope),
    /// GCP project binding
    Gcp(GcpScope),
    /// OpenStack project binding
    #[serde(rename = "openstack")]
    OpenStack(OpenStackScope),
}

impl ScopeInfo {
    /// Provider type implied by the set variant
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::Aws(_) => ProviderType::Aws,
            Self::Azure(_) => ProviderType::Azure,
            Self::Gcp(_) => ProviderType::Gcp,
            Self::OpenStack(_) => ProviderType::OpenStack,
        }
    }
}

/// AWS account binding
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsScope {
    /// AWS account id
    pub account_id: String,
    /// Name tag of the tenant's VPC
    pub vpc_network_name: String,
}

/// Azure subscription binding
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AzureScope {
    /// Azure subscription id
    pub subscription_id: String,
    /// Azure AD tenant id
    pub tenant_id: String,
}

/// GCP project binding
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcpScope {
    /// GCP project id
    pub project: String,
    /// Name of the tenant's VPC network
    pub vpc_network_name: String,
}

/// OpenStack project binding
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackScope {
    /// Keystone domain name
    pub domain_name: String,
    /// OpenStack project name
    pub project_name: String,
}

/// Status for a Scope
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScopeStatus {
    /// Lifecycle state
    #[serde(default)]
    pub state: StatusState,

    /// Conditions representing the Scope state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl_obj_with_conditions!(Scope, ScopeStatus);

impl ScopeSpec {
    /// Create a spec with the provider derived from the scope info, keeping
    /// the two consistent by construction
    pub fn new(
        tenant: impl Into<String>,
        region: impl Into<String>,
        scope_info: ScopeInfo,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            provider: scope_info.provider_type(),
            region: region.into(),
            zones: Vec::new(),
            existing_cidr_ranges: Vec::new(),
            scope_info,
        }
    }

    /// Check the provider field matches the set scopeInfo variant
    pub fn validate(&self) -> Result<()> {
        if self.provider != self.scope_info.provider_type() {
            return Err(Error::validation_for_field(
                &self.tenant,
                "spec.provider",
                format!(
                    "provider {} does not match scopeInfo variant {}",
                    self.provider,
                    self.scope_info.provider_type()
                ),
            ));
        }
        Ok(())
    }
}

impl Scope {
    /// Name of this Scope's shared network object
    ///
    /// The shared network is created together with the Scope and carries the
    /// tenant's main provider network; IpRanges default to it.
    pub fn shared_network_name(&self) -> String {
        format!("{}--shared", self.name_any())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_info_serializes_externally_tagged() {
        let info = ScopeInfo::Aws(AwsScope {
            account_id: "1234".into(),
            vpc_network_name: "shoot--vpc".into(),
        });
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("aws").is_some());

        let os = ScopeInfo::OpenStack(OpenStackScope::default());
        let json = serde_json::to_value(&os).unwrap();
        assert!(json.get("openstack").is_some());
    }

    #[test]
    fn new_spec_derives_matching_provider() {
        let spec = ScopeSpec::new("tenant-a", "eu-west-1", ScopeInfo::Gcp(GcpScope::default()));
        assert_eq!(spec.provider, ProviderType::Gcp);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn validate_rejects_provider_mismatch() {
        let mut spec =
            ScopeSpec::new("tenant-a", "eu-west-1", ScopeInfo::Aws(AwsScope::default()));
        spec.provider = ProviderType::Azure;
        assert!(spec.validate().is_err());
    }
}
