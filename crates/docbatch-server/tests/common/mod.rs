//! Shared fixtures for docbatch-server integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use docbatch_storage::{
    DocumentData, DocumentStore, MemoryDocumentStore, Precondition, Query, StorageError,
    StorageResult, StoredDocument, WriteMeta, WriteMode,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    #[serde(default)]
    pub copies: u32,
}

pub fn book(title: &str) -> Book {
    Book {
        title: title.to_string(),
        copies: 0,
    }
}

pub fn object(value: Value) -> DocumentData {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

/// Counts backend calls and can fail id-set fetches for chosen chunks.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryDocumentStore,
    chunks: Mutex<Vec<usize>>,
    queries: AtomicUsize,
    fail_chunk: Mutex<Option<usize>>,
}

impl CountingStore {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fails the `n`th id-set fetch (0-based) from now on.
    pub fn fail_chunk(&self, n: usize) {
        *self.fail_chunk.lock().unwrap() = Some(n);
    }

    /// Sizes of the id-set fetches issued so far.
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn reads(&self) -> usize {
        self.chunks.lock().unwrap().len() + self.queries.load(Ordering::SeqCst)
    }

    pub async fn seed_books(&self, count: usize) {
        for i in 0..count {
            self.inner
                .write_document(
                    "books",
                    &format!("b{i:02}"),
                    WriteMode::Replace(object(serde_json::json!({
                        "title": format!("Book {i}"),
                        "copies": i,
                    }))),
                    None,
                )
                .await
                .unwrap();
        }
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn fetch_by_id_set(
        &self,
        collection: &str,
        ids: &[String],
    ) -> StorageResult<Vec<StoredDocument>> {
        let index = {
            let mut chunks = self.chunks.lock().unwrap();
            chunks.push(ids.len());
            chunks.len() - 1
        };
        if *self.fail_chunk.lock().unwrap() == Some(index) {
            return Err(StorageError::QueryError {
                message: format!("chunk {index} timed out"),
            });
        }
        self.inner.fetch_by_id_set(collection, ids).await
    }

    async fn fetch_by_query(&self, query: &Query) -> StorageResult<Vec<StoredDocument>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_by_query(query).await
    }

    async fn write_document(
        &self,
        collection: &str,
        id: &str,
        mode: WriteMode,
        precondition: Option<Precondition>,
    ) -> StorageResult<WriteMeta> {
        self.inner
            .write_document(collection, id, mode, precondition)
            .await
    }

    async fn delete_document(
        &self,
        collection: &str,
        id: &str,
        precondition: Option<Precondition>,
    ) -> StorageResult<WriteMeta> {
        self.inner.delete_document(collection, id, precondition).await
    }
}
