//! Error types for storage and repository operations

use roster_core::EntityKind;
use thiserror::Error;

/// Entity store failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} with id {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} with id {id} already exists")]
    AlreadyExists { kind: EntityKind, id: String },

    #[error("Invalid reference from {kind} {id}: {reason}")]
    InvalidReference {
        kind: EntityKind,
        id: String,
        reason: String,
    },

    #[error("Database error: {reason}")]
    Database { reason: String },

    #[error("Connection pool error: {reason}")]
    Pool { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Convert from tokio_postgres::Error to StoreError.
impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        StoreError::Database {
            reason: err.to_string(),
        }
    }
}

/// Convert from deadpool_postgres::PoolError to StoreError.
impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);
        StoreError::Pool {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for entity store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Repository facade failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// A read against the store failed.
    #[error("Lookup failed: {0}")]
    Lookup(#[source] StoreError),

    /// Flushing pending changes failed; nothing was committed.
    #[error("Persisting changes failed: {0}")]
    Persistence(#[source] StoreError),

    /// A tracked handle was mutated into a different entity.
    #[error("Tracked {kind} {id} changed its identity")]
    IdentityChanged { kind: EntityKind, id: String },
}

/// Result type alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;
