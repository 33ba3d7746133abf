//! Service Layer Error Types
//!
//! This module defines the error taxonomy surfaced by every repository
//! operation. Store failures arrive as `anyhow::Error` from the store traits
//! and are carried through unchanged in [`RepositoryError::Store`].

use crate::models::{PathError, PropertyError};
use thiserror::Error;

/// Repository operation errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Node (or property) absent
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Target path already taken in the workspace
    #[error("Node already exists at {path}")]
    AlreadyExists { path: String },

    /// Parent of a target path is missing
    #[error("Parent path not found: {path}")]
    PathNotFound { path: String },

    /// Path failed validation or violates a structural rule
    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),

    /// Value does not fit its type or property definition
    #[error("Value format error: {0}")]
    ValueFormat(String),

    /// Reference constraint violated
    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    /// Operation is declared but not supported
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Query object model could not be lowered
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Stored document did not match the node schema
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backing store failure
    #[error("Store operation failed: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl From<PropertyError> for RepositoryError {
    fn from(err: PropertyError) -> Self {
        Self::ValueFormat(err.to_string())
    }
}

impl RepositoryError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists { path: path.into() }
    }

    pub fn path_not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    pub fn value_format(msg: impl Into<String>) -> Self {
        Self::ValueFormat(msg.into())
    }

    pub fn referential_integrity(msg: impl Into<String>) -> Self {
        Self::ReferentialIntegrity(msg.into())
    }

    pub fn unimplemented(operation: impl Into<String>) -> Self {
        Self::Unimplemented(operation.into())
    }

    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }
}

/// Result alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;
