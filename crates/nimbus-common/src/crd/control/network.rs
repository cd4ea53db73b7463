//! Network CRD: either a managed network to be created at the provider, or a
//! reference to an externally existing one. Exactly one of the two is set.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::types::{
    condition_types, impl_obj_with_conditions, Condition, ConditionStatus, ScopeRef, StatusState,
};

/// Network represents a provider network controllers can create subnets in
/// or peer with.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cloud-control.nimbus.dev",
    version = "v1beta1",
    kind = "Network",
    namespaced,
    status = "NetworkStatus",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Owning Scope
    pub scope: ScopeRef,

    /// What kind of network this is
    #[serde(rename = "type")]
    pub network_type: NetworkType,

    /// Managed definition or external reference; exactly one variant
    pub network: NetworkInfo,
}

/// Role a network plays for its Scope
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum NetworkType {
    /// An external network outside this system's control
    #[serde(rename = "external")]
    External,
    /// The tenant's shared network, created alongside the Scope
    #[serde(rename = "shared")]
    Shared,
    /// A dedicated network created for cloud resources
    #[serde(rename = "cloud-resources")]
    CloudResources,
}

/// Managed definition or external reference; enforces the exactly-one
/// invariant as a sum type
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum NetworkInfo {
    /// A network this system creates and owns at the provider
    Managed(ManagedNetwork),
    /// A reference to a network that already exists at the provider
    Reference(NetworkReference),
}

/// A network to be created at the provider
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedNetwork {
    /// Address space of the network
    pub cidr: String,
    /// Provider location/region to create it in
    pub location: String,
}

/// A network that already exists at the provider
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkReference {
    /// Provider-side name of the network
    pub network_name: String,
}

/// Status for a Network
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// Lifecycle state
    #[serde(default)]
    pub state: StatusState,

    /// Provider identifier once the network exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,

    /// Conditions representing the network state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl_obj_with_conditions!(Network, NetworkStatus);

impl Network {
    /// Build a managed cloud-resources network for the given scope
    pub fn new_managed(
        name: impl Into<String>,
        namespace: impl Into<String>,
        scope_name: impl Into<String>,
        cidr: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Network {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            spec: NetworkSpec {
                scope: ScopeRef {
                    name: scope_name.into(),
                },
                network_type: NetworkType::CloudResources,
                network: NetworkInfo::Managed(ManagedNetwork {
                    cidr: cidr.into(),
                    location: location.into(),
                }),
            },
            status: None,
        }
    }

    /// Whether the network reports Ready=True
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.conditions
                .iter()
                .any(|c| c.type_ == condition_types::READY && c.status == ConditionStatus::True)
        })
    }

    /// Whether the network reports an Error state or condition
    pub fn has_error(&self) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.state == StatusState::Error
                || s.conditions
                    .iter()
                    .any(|c| c.type_ == condition_types::ERROR && c.status == ConditionStatus::True)
        })
    }

    /// Whether this is the tenant's shared network
    pub fn is_shared(&self) -> bool {
        self.spec.network_type == NetworkType::Shared
    }
}
