//! Store doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use docbatch_storage::{
    DocumentData, DocumentStore, MemoryDocumentStore, Precondition, Query, StorageError,
    StorageResult, StoredDocument, WriteMeta, WriteMode,
};

/// Wraps the in-memory store and records every backend call.
///
/// Id-set fetches that include `fail_on_id` fail with a connection error.
#[derive(Default)]
pub(crate) struct RecordingStore {
    pub inner: MemoryDocumentStore,
    id_set_calls: Mutex<Vec<Vec<String>>>,
    query_calls: AtomicUsize,
    write_calls: AtomicUsize,
    fail_on_id: Mutex<Option<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, id: &str) {
        *self.fail_on_id.lock().unwrap() = Some(id.to_string());
    }

    pub fn id_set_calls(&self) -> Vec<Vec<String>> {
        self.id_set_calls.lock().unwrap().clone()
    }

    pub fn read_count(&self) -> usize {
        self.id_set_calls.lock().unwrap().len() + self.query_calls.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Writes directly to the backing store without recording the call.
    pub async fn seed(&self, collection: &str, id: &str, value: Value) {
        self.inner
            .write_document(collection, id, WriteMode::Replace(object(value)), None)
            .await
            .unwrap();
    }
}

pub(crate) fn object(value: Value) -> DocumentData {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn fetch_by_id_set(
        &self,
        collection: &str,
        ids: &[String],
    ) -> StorageResult<Vec<StoredDocument>> {
        self.id_set_calls.lock().unwrap().push(ids.to_vec());
        let fail_on = self.fail_on_id.lock().unwrap().clone();
        if let Some(bad) = fail_on {
            if ids.contains(&bad) {
                return Err(StorageError::ConnectionError {
                    message: format!("lost connection while reading {bad}"),
                });
            }
        }
        self.inner.fetch_by_id_set(collection, ids).await
    }

    async fn fetch_by_query(&self, query: &Query) -> StorageResult<Vec<StoredDocument>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_by_query(query).await
    }

    async fn write_document(
        &self,
        collection: &str,
        id: &str,
        mode: WriteMode,
        precondition: Option<Precondition>,
    ) -> StorageResult<WriteMeta> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
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
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_document(collection, id, precondition).await
    }
}
