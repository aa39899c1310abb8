//! Error types for the authorization engine

use crate::hierarchy::HierarchyViolation;
use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A collaborator (role, policy or resource store) failed
    #[error("Store error: {0}")]
    Store(String),

    /// Policy not found
    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    /// Role not found
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    /// Role hierarchy rule broken
    #[error("Invalid role hierarchy: {0}")]
    Hierarchy(#[from] HierarchyViolation),

    /// Lifecycle transition not permitted (e.g. deactivating a system role)
    #[error("Lifecycle violation: {0}")]
    Lifecycle(String),

    /// Snapshot (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// Shorthand for a collaborator failure
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
