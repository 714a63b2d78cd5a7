//! Batch function contract.

use std::hash::Hash;

use async_trait::async_trait;

use crate::error::LoaderError;

/// Loads the values for a set of keys in one backend round trip.
///
/// `load` receives the deduplicated keys of one batch group in registration
/// order and must return exactly one result per key, in the same order.
/// A missing value is a successful result (for example `Ok(None)`); an `Err`
/// for the whole call fails every caller waiting on the group.
#[async_trait]
pub trait BatchFn<K: Send + Sync + Hash + Eq + Clone + 'static>: Send + Sync + 'static {
    /// Type of value.
    type Value: Clone + Send + Sync + 'static;

    /// Type of error.
    type Error: Clone + Send + Sync + From<LoaderError> + 'static;

    /// Load the data set specified by the `keys`.
    async fn load(
        &self,
        keys: &[K],
    ) -> Result<Vec<Result<Self::Value, Self::Error>>, Self::Error>;
}
