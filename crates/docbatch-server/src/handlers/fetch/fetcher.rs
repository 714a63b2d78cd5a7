//! Chunked id fetcher implementation.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use docbatch_domain::BatchFn;
use docbatch_storage::{DocumentStore, StoredDocument, MAX_IN_FILTER_SIZE};

use crate::document::Document;
use crate::error::RepositoryError;

/// Batch function that loads documents of one collection by id.
///
/// Absent ids resolve to `Ok(None)`. A document whose data does not decode
/// into `A` fails only its own key.
pub struct ChunkedIdFetcher<S, A> {
    store: Arc<S>,
    collection: String,
    max_in_filter_size: usize,
    _document: PhantomData<fn() -> A>,
}

impl<S, A> ChunkedIdFetcher<S, A> {
    /// Creates a fetcher for `collection` using the backend's IN-filter bound.
    pub fn new(store: Arc<S>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            max_in_filter_size: MAX_IN_FILTER_SIZE,
            _document: PhantomData,
        }
    }

    /// Sets the number of ids sent per backend call (at least 1).
    pub fn with_max_in_filter_size(mut self, size: usize) -> Self {
        self.max_in_filter_size = size.max(1);
        self
    }

    /// Returns the collection path this fetcher reads from.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the chunk size.
    pub fn max_in_filter_size(&self) -> usize {
        self.max_in_filter_size
    }
}

#[async_trait]
impl<S, A> BatchFn<String> for ChunkedIdFetcher<S, A>
where
    S: DocumentStore,
    A: DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Value = Option<Document<A>>;
    type Error = RepositoryError;

    async fn load(
        &self,
        ids: &[String],
    ) -> Result<Vec<Result<Option<Document<A>>, RepositoryError>>, RepositoryError> {
        let chunks: Vec<&[String]> = ids.chunks(self.max_in_filter_size).collect();
        debug!(
            collection = %self.collection,
            ids = ids.len(),
            chunks = chunks.len(),
            "fetching documents by id"
        );

        let fetches = chunks
            .iter()
            .map(|chunk| self.store.fetch_by_id_set(&self.collection, chunk));
        let fetched = try_join_all(fetches).await.map_err(|e| {
            warn!(collection = %self.collection, error = %e, "chunked fetch failed");
            RepositoryError::from(e)
        })?;

        let mut by_id: HashMap<String, StoredDocument> = HashMap::with_capacity(ids.len());
        for doc in fetched.into_iter().flatten() {
            by_id.entry(doc.id.clone()).or_insert(doc);
        }

        Ok(ids
            .iter()
            .map(|id| match by_id.get(id) {
                Some(stored) => Document::decode(&self.collection, stored).map(Some),
                None => Ok(None),
            })
            .collect())
    }
}
