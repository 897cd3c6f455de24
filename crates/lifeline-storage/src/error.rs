//! Storage error types.

use thiserror::Error;
use uuid::Uuid;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Node not found.
    #[error("node not found: {node_id}")]
    NodeNotFound { node_id: Uuid },

    /// Node already exists.
    #[error("node already exists: {node_id}")]
    NodeExists { node_id: Uuid },

    /// A reparent would place a node inside its own subtree.
    #[error("moving node {node_id} under {new_parent} would create a cycle")]
    WouldCreateCycle { node_id: Uuid, new_parent: Uuid },

    /// Database connection error.
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    QueryError { message: String },

    /// Query exceeded its timeout.
    #[error("query timeout in {operation} after {timeout:?}")]
    QueryTimeout {
        operation: String,
        timeout: std::time::Duration,
    },

    /// Transaction error.
    #[error("transaction error: {message}")]
    TransactionError { message: String },

    /// Serialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
