//! Repository error types.

use docbatch_domain::LoaderError;
use docbatch_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by collection operations.
///
/// `Clone` because one batch failure is delivered to every caller awaiting
/// the batch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RepositoryError {
    /// The backend call failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The loader could not be obtained or returned a malformed batch.
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// The mutation's precondition is not supported. Reported before any I/O.
    #[error("invalid precondition: {message}")]
    InvalidPrecondition { message: String },

    /// The query targets another collection.
    #[error("invalid query: {message}")]
    InvalidQuery { message: String },

    /// Stored data does not match the collection's document type.
    #[error("failed to decode {collection}/{id}: {message}")]
    Decode {
        collection: String,
        id: String,
        message: String,
    },

    /// Document data could not be written as a JSON object.
    #[error("failed to encode {collection}/{id}: {message}")]
    Encode {
        collection: String,
        id: String,
        message: String,
    },
}

/// Result type for collection operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;
