//! Collection handle implementation.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use docbatch_domain::{Loader, LoaderScope};
use docbatch_storage::{
    validate_collection_path, validate_document_id, validate_precondition, validate_write_mode,
    DocumentData, DocumentStore, Precondition, Query, StorageError, WriteMeta, WriteMode,
    MAX_IN_FILTER_SIZE,
};

use crate::document::Document;
use crate::error::{RepositoryError, RepositoryResult};
use crate::handlers::fetch::ChunkedIdFetcher;

type CollectionLoader<S, A> = Loader<String, ChunkedIdFetcher<S, A>>;

/// Typed access to one collection of a document store.
///
/// A `Collection` holds no cache of its own. Every operation takes the
/// [`LoaderScope`] of the current unit of work, and the loader for this
/// collection is looked up there by collection path, so two `Collection`
/// values for the same path share one cache within a scope.
///
/// The loader, and with it the chunk size, is created by the first handle
/// that touches the path in a scope. Later handles for the same path reuse
/// it whatever their own [`with_max_in_filter_size`](Self::with_max_in_filter_size).
pub struct Collection<S, A> {
    store: Arc<S>,
    path: String,
    max_in_filter_size: usize,
    _document: PhantomData<fn() -> A>,
}

impl<S, A> Clone for Collection<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            path: self.path.clone(),
            max_in_filter_size: self.max_in_filter_size,
            _document: PhantomData,
        }
    }
}

impl<S, A> std::fmt::Debug for Collection<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("path", &self.path)
            .field("max_in_filter_size", &self.max_in_filter_size)
            .finish()
    }
}

impl<S, A> Collection<S, A>
where
    S: DocumentStore,
    A: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates a collection handle for `path` (e.g. `"users"` or
    /// `"users/alice/posts"`).
    pub fn new(store: Arc<S>, path: impl Into<String>) -> RepositoryResult<Self> {
        let path = path.into();
        validate_collection_path(&path)?;
        Ok(Self {
            store,
            path,
            max_in_filter_size: MAX_IN_FILTER_SIZE,
            _document: PhantomData,
        })
    }

    /// Sets the number of ids per backend fetch for loaders created by this
    /// handle.
    ///
    /// Has no effect in a scope where another handle for the same path has
    /// already created the loader.
    pub fn with_max_in_filter_size(mut self, size: usize) -> Self {
        self.max_in_filter_size = size.max(1);
        self
    }

    /// Returns the collection path, which is also the loader identity.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn loader(&self, scope: &LoaderScope) -> RepositoryResult<Arc<CollectionLoader<S, A>>> {
        let loader = scope.get_or_create(&self.path, || {
            ChunkedIdFetcher::new(Arc::clone(&self.store), self.path.clone())
                .with_max_in_filter_size(self.max_in_filter_size)
        })?;
        let in_use = loader.batch_fn().max_in_filter_size();
        if in_use != self.max_in_filter_size {
            debug!(
                collection = %self.path,
                requested = self.max_in_filter_size,
                in_use,
                "scope already holds a loader for this path with another chunk size"
            );
        }
        Ok(loader)
    }

    /// Loads one document by id. Absence is `Ok(None)`.
    pub async fn find_by_id(
        &self,
        scope: &LoaderScope,
        id: &str,
    ) -> RepositoryResult<Option<Document<A>>> {
        self.loader(scope)?.load(id.to_string()).await
    }

    /// Loads several documents by id, one result per id in input order.
    ///
    /// The outer error is reserved for loader misuse; backend and decode
    /// failures are reported per id.
    pub async fn find_many<I>(
        &self,
        scope: &LoaderScope,
        ids: I,
    ) -> RepositoryResult<Vec<RepositoryResult<Option<Document<A>>>>>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let loader = self.loader(scope)?;
        Ok(loader.load_many(ids.into_iter().map(Into::into)).await)
    }

    /// Reads every document of the collection and primes each one.
    pub async fn find_all(&self, scope: &LoaderScope) -> RepositoryResult<Vec<Document<A>>> {
        self.run_query(scope, Query::collection(self.path.clone()))
            .await
    }

    /// Runs `query` against this collection and primes each returned document.
    #[instrument(skip(self, scope, query), fields(collection = %self.path))]
    pub async fn run_query(
        &self,
        scope: &LoaderScope,
        query: Query,
    ) -> RepositoryResult<Vec<Document<A>>> {
        if query.collection != self.path {
            return Err(RepositoryError::InvalidQuery {
                message: format!(
                    "query targets '{}' but collection is '{}'",
                    query.collection, self.path
                ),
            });
        }
        let loader = self.loader(scope)?;

        let stored = self.store.fetch_by_query(&query).await?;
        let documents = stored
            .iter()
            .map(|doc| Document::decode(&self.path, doc))
            .collect::<RepositoryResult<Vec<_>>>()?;

        for document in &documents {
            loader.prime(document.id.clone(), Ok(Some(document.clone())));
        }
        debug!(documents = documents.len(), "primed query results");
        Ok(documents)
    }

    /// Replaces (or creates) a document and primes it.
    #[instrument(skip(self, scope, document), fields(collection = %self.path, id = %document.id))]
    pub async fn put(
        &self,
        scope: &LoaderScope,
        document: Document<A>,
    ) -> RepositoryResult<WriteMeta> {
        validate_document_id(&document.id)?;
        let data = document.encode(&self.path)?;
        let loader = self.loader(scope)?;

        let meta = self
            .store
            .write_document(&self.path, &document.id, WriteMode::Replace(data), None)
            .await?;

        loader.prime(document.id.clone(), Ok(Some(document)));
        Ok(meta)
    }

    /// Deep-merges `patch` into a document (creating it if missing) and
    /// clears its entry.
    #[instrument(skip(self, scope, patch), fields(collection = %self.path))]
    pub async fn merge(
        &self,
        scope: &LoaderScope,
        id: &str,
        patch: DocumentData,
    ) -> RepositoryResult<WriteMeta> {
        self.mutate(scope, id, WriteMode::Merge(patch), None).await
    }

    /// Copies only the dotted `field_paths` of `patch` into a document
    /// (creating it if missing) and clears its entry. Every listed path must
    /// have a value in `patch`.
    #[instrument(
        skip(self, scope, patch, field_paths),
        fields(collection = %self.path, paths = field_paths.len())
    )]
    pub async fn merge_fields(
        &self,
        scope: &LoaderScope,
        id: &str,
        patch: DocumentData,
        field_paths: Vec<String>,
    ) -> RepositoryResult<WriteMeta> {
        let mode = WriteMode::MergeFields {
            data: patch,
            fields: field_paths,
        };
        self.mutate(scope, id, mode, None).await
    }

    /// Sets dotted field paths on an existing document and clears its entry.
    #[instrument(skip(self, scope, updates), fields(collection = %self.path))]
    pub async fn update_fields(
        &self,
        scope: &LoaderScope,
        id: &str,
        updates: DocumentData,
        precondition: Option<Precondition>,
    ) -> RepositoryResult<WriteMeta> {
        self.mutate(scope, id, WriteMode::UpdatePaths(updates), precondition)
            .await
    }

    /// Deletes a document and clears its entry.
    #[instrument(skip(self, scope), fields(collection = %self.path))]
    pub async fn remove(
        &self,
        scope: &LoaderScope,
        id: &str,
        precondition: Option<Precondition>,
    ) -> RepositoryResult<WriteMeta> {
        validate_document_id(id)?;
        check_precondition(None, precondition.as_ref())?;
        let loader = self.loader(scope)?;

        let meta = self
            .store
            .delete_document(&self.path, id, precondition)
            .await?;

        loader.clear(&id.to_string());
        Ok(meta)
    }

    async fn mutate(
        &self,
        scope: &LoaderScope,
        id: &str,
        mode: WriteMode,
        precondition: Option<Precondition>,
    ) -> RepositoryResult<WriteMeta> {
        validate_document_id(id)?;
        validate_write_mode(&mode)?;
        check_precondition(Some(&mode), precondition.as_ref())?;
        let loader = self.loader(scope)?;

        let meta = self
            .store
            .write_document(&self.path, id, mode, precondition)
            .await?;

        loader.clear(&id.to_string());
        Ok(meta)
    }
}

fn check_precondition(
    mode: Option<&WriteMode>,
    precondition: Option<&Precondition>,
) -> RepositoryResult<()> {
    validate_precondition(mode, precondition).map_err(|e| RepositoryError::InvalidPrecondition {
        message: match e {
            StorageError::InvalidInput { message } => message,
            other => other.to_string(),
        },
    })
}
