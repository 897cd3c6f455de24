//! Domain error types for authorization operations.

use thiserror::Error;

/// Domain-specific errors for authorization operations.
///
/// Denied access is never an error: `can_access` and `check_batch` report
/// denial as an ordinary `false`/bucket result. Errors from this family
/// signal malformed input or missing data.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A textual node id is not a well-formed identifier.
    #[error("invalid node identifier: {value}")]
    InvalidIdentifier { value: String },

    /// A subject id is not a positive integer.
    #[error("invalid subject id: {value}")]
    InvalidSubject { value: i64 },

    /// A mutation was attempted by someone other than the node owner.
    #[error("user {user_id} is not the owner of node {node_id}")]
    NotOwner { user_id: i64, node_id: uuid::Uuid },

    /// A policy references an organization the acting user does not belong to.
    #[error("user {user_id} is not a member of organization {org_id}")]
    NotOrgMember { user_id: i64, org_id: i64 },

    /// The policy set exceeds the per-node bound.
    #[error("policy count {count} exceeds maximum of {max} per node")]
    TooManyPolicies { count: usize, max: usize },

    /// An edit/share/delete grant was recorded below full detail level.
    #[error("action '{action}' requires full detail level")]
    InsufficientLevelForAction { action: String },

    /// A policy expiry is in the past or beyond the allowed horizon.
    #[error("invalid policy expiry: {message}")]
    InvalidExpiry { message: String },

    /// The referenced node does not exist.
    #[error("node not found: {node_id}")]
    NodeNotFound { node_id: uuid::Uuid },

    /// A batch request exceeds the maximum allowed size.
    #[error("batch size {size} exceeds maximum allowed {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// Underlying store failure, propagated unchanged.
    ///
    /// The engine performs no retries; retry policy belongs to the caller.
    #[error("storage error: {message}")]
    Store { message: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
