//! Supporting types shared by all Nimbus CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition types used across resources
pub mod condition_types {
    /// Resource has converged and is usable
    pub const READY: &str = "Ready";
    /// Resource hit a domain error; details in reason/message
    pub const ERROR: &str = "Error";
    /// Resource is held back by a recoverable situation
    pub const WARNING: &str = "Warning";
}

/// Machine-readable condition reasons
pub mod reasons {
    /// Resource is ready
    pub const READY: &str = "Ready";
    /// Spec CIDR is empty and automatic allocation is disabled
    pub const CIDR_REQUIRED: &str = "CidrRequired";
    /// Spec CIDR cannot be parsed
    pub const INVALID_CIDR: &str = "InvalidCidr";
    /// CIDR overlaps a range already recorded against the Scope
    pub const CIDR_OVERLAP: &str = "CidrOverlap";
    /// Effective CIDR is immutable once set in status
    pub const CIDR_CAN_NOT_CHANGE: &str = "CidrCanNotChange";
    /// CIDR is too small to cover the zone count
    pub const CIDR_CAN_NOT_SPLIT: &str = "CidrCanNotSplit";
    /// No free block of the requested size could be found
    pub const CIDR_ALLOCATION_FAILED: &str = "CidrAllocationFailed";
    /// Provider rejected or failed the VPC CIDR association
    pub const CIDR_ASSOCIATION_FAILED: &str = "CidrAssociationFailed";
    /// The Scope's VPC could not be found at the provider
    pub const VPC_NOT_FOUND: &str = "VpcNotFound";
    /// Deletion is blocked by resources still using this range
    pub const DELETE_WHILE_USED: &str = "DeleteWhileUsed";
    /// The Scope's shared network is absent, which should never happen
    pub const SHARED_NETWORK_MISSING: &str = "SharedNetworkMissing";
    /// The owning network reported an Error state
    pub const NETWORK_ERROR: &str = "NetworkError";
    /// The peering with the shared network reported an Error state
    pub const PEERING_ERROR: &str = "PeeringError";
    /// A long-running provider operation failed
    pub const OPERATION_FAILED: &str = "OperationFailed";
    /// The control-plane mirror of a tenant resource reported an error
    pub const MIRROR_ERROR: &str = "MirrorError";
}

/// Supported cloud provider types
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Amazon Web Services
    Aws,
    /// Microsoft Azure
    Azure,
    /// Google Cloud Platform
    Gcp,
    /// OpenStack private cloud
    OpenStack,
}

impl std::str::FromStr for ProviderType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "azure" => Ok(Self::Azure),
            "gcp" => Ok(Self::Gcp),
            "openstack" => Ok(Self::OpenStack),
            _ => Err(crate::Error::validation(format!(
                "invalid provider type: {s}, expected one of: aws, azure, gcp, openstack"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aws => write!(f, "aws"),
            Self::Azure => write!(f, "azure"),
            Self::Gcp => write!(f, "gcp"),
            Self::OpenStack => write!(f, "openstack"),
        }
    }
}

/// Lifecycle state surfaced in every resource status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum StatusState {
    /// Reconciliation is in progress
    #[default]
    Processing,
    /// Resource has converged
    Ready,
    /// A domain error blocks convergence
    Error,
    /// A recoverable situation holds the resource back
    Warning,
    /// Resource is marked for deletion and tearing down
    Deleting,
}

impl std::fmt::Display for StatusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "Processing"),
            Self::Ready => write!(f, "Ready"),
            Self::Error => write!(f, "Error"),
            Self::Warning => write!(f, "Warning"),
            Self::Deleting => write!(f, "Deleting"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (Ready, Error, Warning)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// Ready=True condition
    pub fn ready() -> Self {
        Self::new(
            condition_types::READY,
            ConditionStatus::True,
            reasons::READY,
            "Resource is ready",
        )
    }

    /// Error=True condition with the given reason and message
    pub fn error(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(condition_types::ERROR, ConditionStatus::True, reason, message)
    }

    /// Warning=True condition with the given reason and message
    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            condition_types::WARNING,
            ConditionStatus::True,
            reason,
            message,
        )
    }
}

/// Compare two condition lists as sets keyed by type, ignoring transition
/// timestamps
///
/// This is the equality the status patch builder uses to decide whether a
/// write is needed at all.
pub fn same_conditions(a: &[Condition], b: &[Condition]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|ca| {
        b.iter().any(|cb| {
            ca.type_ == cb.type_
                && ca.status == cb.status
                && ca.reason == cb.reason
                && ca.message == cb.message
        })
    })
}

/// Access to the status state and conditions of a reconciled resource
///
/// Implemented by every CRD the status patch builder operates on. Accessors
/// materialize a default status on demand so callers never deal with the
/// `Option<Status>` wrapper.
pub trait ObjWithConditions: Send + Sync {
    /// Current status state, defaulting to Processing when status is unset
    fn state(&self) -> StatusState;
    /// Replace the status state
    fn set_state(&mut self, state: StatusState);
    /// Current conditions, empty when status is unset
    fn conditions(&self) -> &[Condition];
    /// Mutable access to conditions, materializing the status if needed
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
}

macro_rules! impl_obj_with_conditions {
    ($obj:ty, $status:ty) => {
        impl $crate::crd::types::ObjWithConditions for $obj {
            fn state(&self) -> $crate::crd::types::StatusState {
                self.status
                    .as_ref()
                    .map(|s| s.state.clone())
                    .unwrap_or_default()
            }

            fn set_state(&mut self, state: $crate::crd::types::StatusState) {
                self.status.get_or_insert_with(<$status>::default).state = state;
            }

            fn conditions(&self) -> &[$crate::crd::types::Condition] {
                self.status
                    .as_ref()
                    .map(|s| s.conditions.as_slice())
                    .unwrap_or(&[])
            }

            fn conditions_mut(&mut self) -> &mut Vec<$crate::crd::types::Condition> {
                &mut self
                    .status
                    .get_or_insert_with(<$status>::default)
                    .conditions
            }
        }
    };
}
pub(crate) use impl_obj_with_conditions;

/// Identity of the tenant-side origin of a control-plane resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRef {
    /// Namespace of the origin object in the tenant cluster
    pub namespace: String,
    /// Name of the origin object in the tenant cluster
    pub name: String,
}

impl std::fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference to the owning Scope
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRef {
    /// Name of the Scope object
    pub name: String,
}

/// Reference to a Network object in the same namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRef {
    /// Name of the Network object
    pub name: String,
}

/// Reference to an IpRange object in the same namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IpRangeRef {
    /// Name of the IpRange object
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_type_round_trips() {
        for s in ["aws", "azure", "gcp", "openstack"] {
            let p: ProviderType = s.parse().unwrap();
            assert_eq!(p.to_string(), s);
        }
        assert!("docker".parse::<ProviderType>().is_err());
    }

    #[test]
    fn same_conditions_ignores_timestamps_and_order() {
        let mut a = Condition::ready();
        a.last_transition_time = chrono::DateTime::<Utc>::MIN_UTC;
        let b = Condition::ready();
        let e = Condition::error(reasons::INVALID_CIDR, "bad");

        assert!(same_conditions(&[a.clone(), e.clone()], &[e.clone(), b.clone()]));
        assert!(!same_conditions(&[a.clone()], &[e.clone()]));
        assert!(!same_conditions(&[a], &[b, e]));
    }
}
