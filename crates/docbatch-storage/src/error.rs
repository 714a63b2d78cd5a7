//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
///
/// Errors are `Clone` so a single backend failure can be handed to every
/// caller waiting on the same batched fetch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    /// Document not found where the operation requires it to exist.
    #[error("document not found: {collection}/{id}")]
    DocumentNotFound { collection: String, id: String },

    /// A write or delete precondition did not hold.
    #[error("precondition failed for {collection}/{id}: {message}")]
    PreconditionFailed {
        collection: String,
        id: String,
        message: String,
    },

    /// Backend connection error.
    #[error("backend connection error: {message}")]
    ConnectionError { message: String },

    /// Backend query error.
    #[error("backend query error: {message}")]
    QueryError { message: String },

    /// Invalid filter error.
    #[error("invalid filter: {message}")]
    InvalidFilter { message: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Serialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
