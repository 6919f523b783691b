//! Error types for the console operator

use thiserror::Error;

use crate::sync::ResourceKind;

/// Main error type for console operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error outside of a resource adapter (status writes, CRD install)
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A backend call for a managed resource failed for a reason other than not-found
    #[error("{resource} backend error: {message}")]
    Backend {
        /// Resource kind the call was made for
        resource: ResourceKind,
        /// Description of what failed
        message: String,
    },

    /// A write lost an optimistic-concurrency race against another writer
    #[error("{resource} write conflict: {message}")]
    Conflict {
        /// Resource kind that was being written
        resource: ResourceKind,
        /// Description of the conflict
        message: String,
    },

    /// A resource the pipeline cannot create itself is missing
    #[error("{resource} missing: {message}")]
    MissingPrerequisite {
        /// Resource kind that is missing
        resource: ResourceKind,
        /// What an operator has to do about it
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid input (desired state or object shape)
    #[error("validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Create a backend error for the given resource kind
    pub fn backend(resource: ResourceKind, msg: impl Into<String>) -> Self {
        Self::Backend {
            resource,
            message: msg.into(),
        }
    }

    /// Create a conflict error for the given resource kind
    pub fn conflict(resource: ResourceKind, msg: impl Into<String>) -> Self {
        Self::Conflict {
            resource,
            message: msg.into(),
        }
    }

    /// Create a missing-prerequisite error for the given resource kind
    pub fn missing(resource: ResourceKind, msg: impl Into<String>) -> Self {
        Self::MissingPrerequisite {
            resource,
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether a later pass may succeed without anyone changing anything.
    ///
    /// Missing prerequisites and malformed input need an operator; backend
    /// failures and lost write races usually clear up on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube(_) | Self::Backend { .. } | Self::Conflict { .. } => true,
            Self::MissingPrerequisite { .. } | Self::Serialization(_) | Self::Validation(_) => {
                false
            }
        }
    }

    /// Resource kind the error is attributed to, if any
    pub fn resource(&self) -> Option<ResourceKind> {
        match self {
            Self::Backend { resource, .. }
            | Self::Conflict { resource, .. }
            | Self::MissingPrerequisite { resource, .. } => Some(*resource),
            _ => None,
        }
    }
}
