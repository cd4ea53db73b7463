//! Error types for Nimbus controllers
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries contextual information like resource names,
//! provider types, and underlying causes.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Nimbus operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error from the declarative object store
    #[error("store error: {source}")]
    Store {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for resource specs
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.cidr")
        field: Option<String>,
    },

    /// Cloud provider error
    #[error("provider error [{provider}] for {resource}: {message}")]
    Provider {
        /// Name of the resource being provisioned
        resource: String,
        /// Provider type (aws, azure, gcp, openstack)
        provider: String,
        /// Description of what failed
        message: String,
        /// Whether this error is retryable
        retryable: bool,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "state")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    ///
    /// For simple validation errors without resource context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with resource context
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with resource context and field path
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a retryable provider error
    pub fn provider(
        resource: impl Into<String>,
        provider: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Provider {
            resource: resource.into(),
            provider: provider.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable provider error
    pub fn provider_fatal(
        resource: impl Into<String>,
        provider: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Provider {
            resource: resource.into(),
            provider: provider.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether retrying the failed operation can be expected to make progress
    ///
    /// Store conflicts and transient provider errors are retryable; validation
    /// and serialization errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store { .. } => true,
            Self::Provider { retryable, .. } => *retryable,
            Self::Validation { .. } | Self::Serialization { .. } | Self::Internal { .. } => false,
        }
    }

    /// Whether this is an optimistic-concurrency conflict from the store
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Store {
                source: kube::Error::Api(e)
            } if e.code == 409
        )
    }

    /// Whether this is a not-found response from the store
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Store {
                source: kube::Error::Api(e)
            } if e.code == 404
        )
    }

    /// Whether this is an already-exists response from the store
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::Store {
                source: kube::Error::Api(e)
            } if e.code == 409 && e.reason == "AlreadyExists"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = Error::validation_for("range-1", "invalid CIDR");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("range-1"));
    }

    #[test]
    fn provider_errors_carry_retryability() {
        assert!(Error::provider("r", "aws", "throttled").is_retryable());
        assert!(!Error::provider_fatal("r", "aws", "bad request").is_retryable());
    }
}
