//! Domain error types for loader operations.

use thiserror::Error;

/// Errors raised by the loader engine itself, independent of any backend.
///
/// Batch function error types must be constructible from this so the engine
/// can report its own failures through the same channel as backend failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoaderError {
    /// A batch function returned a different number of results than keys.
    #[error("batch function returned {actual} results for {expected} keys")]
    BatchSizeMismatch { expected: usize, actual: usize },

    /// A scope identity was reused for a loader with different key or value types.
    #[error("loader identity '{identity}' is already registered with a different loader type")]
    IdentityTypeMismatch { identity: String },
}

/// Result type for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;
