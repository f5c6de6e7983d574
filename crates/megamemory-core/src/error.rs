//! Error types for the graph engine.
//!
//! Every fallible operation in the crate returns [`GraphError`]. The variants
//! map one-to-one onto the stable `error_kind` strings the tool transport
//! reports, so callers can match on [`GraphError::kind`] without parsing
//! messages.

use std::path::PathBuf;

/// Graph engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Node or merge group missing
    #[error("Not found: {0}")]
    NotFound(String),
    /// Creating an id that already exists (live or removed)
    #[error("Concept id already exists: {0}")]
    Duplicate(String),
    /// Parent id missing or removed
    #[error("Invalid parent: {0}")]
    InvalidParent(String),
    /// Id failed slug validation
    #[error("Invalid id: {0}")]
    InvalidId(String),
    /// Double soft-delete
    #[error("Concept already removed: {0}")]
    AlreadyRemoved(String),
    /// Empty or whitespace-only embedding input
    #[error("Embedding input is empty")]
    EmbeddingInput,
    /// Mismatched vector lengths during similarity
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDim { expected: usize, actual: usize },
    /// Embedding provider failed to initialize
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),
    /// A schema migration could not complete
    #[error("Schema migration to v{version} failed: {detail}")]
    SchemaMigration { version: u32, detail: String },
    /// Failure opening, writing, or renaming a store during merge
    #[error("Merge I/O failure at {path}: {detail}")]
    MergeIo { path: PathBuf, detail: String },
    /// Corrupt store condition (edge to removed node, unknown kind, cycle)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    /// Underlying database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Underlying I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    /// Stable `error_kind` string for the wire contract.
    pub fn kind(&self) -> &'static str {
        match self {
            GraphError::NotFound(_) => "NotFound",
            GraphError::Duplicate(_) => "Duplicate",
            GraphError::InvalidParent(_) => "InvalidParent",
            GraphError::InvalidId(_) => "InvalidId",
            GraphError::AlreadyRemoved(_) => "AlreadyRemoved",
            GraphError::EmbeddingInput => "EmbeddingInput",
            GraphError::EmbeddingDim { .. } => "EmbeddingDim",
            GraphError::EmbeddingUnavailable(_) => "EmbeddingUnavailable",
            GraphError::SchemaMigration { .. } => "SchemaMigration",
            GraphError::MergeIo { .. } => "MergeIO",
            GraphError::InvariantViolation(_) => "InvariantViolation",
            GraphError::Database(_) => "Database",
            GraphError::Io(_) => "Io",
        }
    }
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;
