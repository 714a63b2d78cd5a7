//! In-memory storage implementation for testing.
//!
//! Documents are kept per collection in a `BTreeMap` so unordered queries
//! return documents sorted by id, the same order the hosted backend uses.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tracing::instrument;

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    lookup_path, validate_collection_path, validate_document_id, validate_precondition,
    validate_query, validate_write_mode, Direction, DocumentData, DocumentStore, FieldFilter,
    FieldRef, FilterOp, Precondition, Query, StoredDocument, WriteMeta, WriteMode,
};

/// In-memory implementation of DocumentStore.
///
/// # Performance Characteristics
///
/// - **Write / delete**: O(log N) per document (BTreeMap)
/// - **Queries**: O(N) where N is documents in the collection (linear scan)
///
/// Uses DashMap so collections can be accessed concurrently; a single
/// collection is locked for the duration of one write.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<String, BTreeMap<String, StoredDocument>>,
}

impl MemoryDocumentStore {
    /// Creates a new in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory document store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the number of documents in a collection.
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }
}

/// Sets a dotted field path, creating intermediate maps as needed.
fn set_path(data: &mut DocumentData, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            data.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = data
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(DocumentData::new()));
            if !entry.is_object() {
                *entry = Value::Object(DocumentData::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

/// Deep-merges `patch` into `target`. Nested maps merge, everything else replaces.
fn deep_merge(target: &mut DocumentData, patch: DocumentData) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (Some(slot), value) => *slot = value,
            (None, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn field_value(doc: &StoredDocument, field: &FieldRef) -> Option<Value> {
    match field {
        FieldRef::DocumentId => Some(Value::String(doc.id.clone())),
        FieldRef::Path(path) => lookup_path(&doc.data, path).cloned(),
    }
}

fn matches_filter(doc: &StoredDocument, filter: &FieldFilter) -> bool {
    let Some(actual) = field_value(doc, &filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Equal => actual == filter.value,
        FilterOp::In => filter
            .value
            .as_array()
            .is_some_and(|values| values.contains(&actual)),
    }
}

/// Type rank used to order values of different JSON types.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn check_precondition(
    collection: &str,
    id: &str,
    existing: Option<&StoredDocument>,
    precondition: Option<&Precondition>,
) -> StorageResult<()> {
    let Some(precondition) = precondition else {
        return Ok(());
    };
    let failed = |message: String| StorageError::PreconditionFailed {
        collection: collection.to_string(),
        id: id.to_string(),
        message,
    };

    if let Some(exists) = precondition.exists {
        if exists != existing.is_some() {
            return Err(failed(format!(
                "expected document to {}exist",
                if exists { "" } else { "not " }
            )));
        }
    }
    if let Some(expected) = precondition.last_update_time {
        match existing {
            Some(doc) if doc.update_time == expected => {}
            Some(doc) => {
                return Err(failed(format!(
                    "last update time is {}, expected {}",
                    doc.update_time, expected
                )))
            }
            None => return Err(failed("document does not exist".to_string())),
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    #[instrument(skip(self, query), fields(collection = %query.collection))]
    async fn fetch_by_query(&self, query: &Query) -> StorageResult<Vec<StoredDocument>> {
        validate_query(query)?;

        let mut matched: Vec<StoredDocument> = self
            .collections
            .get(&query.collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| query.filters.iter().all(|f| matches_filter(doc, f)))
                    // Ordering on a field excludes documents that lack it.
                    .filter(|doc| {
                        query
                            .order_by
                            .iter()
                            .all(|(field, _)| field_value(doc, field).is_some())
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !query.order_by.is_empty() {
            matched.sort_by(|a, b| {
                query
                    .order_by
                    .iter()
                    .map(|(field, direction)| {
                        let ordering = match (field_value(a, field), field_value(b, field)) {
                            (Some(x), Some(y)) => compare_values(&x, &y),
                            _ => Ordering::Equal,
                        };
                        match direction {
                            Direction::Ascending => ordering,
                            Direction::Descending => ordering.reverse(),
                        }
                    })
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }

        Ok(matched)
    }

    #[instrument(skip(self, mode), fields(mode = mode.name()))]
    async fn write_document(
        &self,
        collection: &str,
        id: &str,
        mode: WriteMode,
        precondition: Option<Precondition>,
    ) -> StorageResult<WriteMeta> {
        validate_collection_path(collection)?;
        validate_document_id(id)?;
        validate_write_mode(&mode)?;
        validate_precondition(Some(&mode), precondition.as_ref())?;

        let now = Utc::now();
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        let existing = docs.get(id);
        check_precondition(collection, id, existing, precondition.as_ref())?;

        let create_time = existing.map_or(now, |doc| doc.create_time);
        let data = match mode {
            WriteMode::Replace(data) => data,
            WriteMode::Merge(patch) => {
                let mut data = existing.map(|doc| doc.data.clone()).unwrap_or_default();
                deep_merge(&mut data, patch);
                data
            }
            WriteMode::UpdatePaths(fields) => {
                let mut data = existing
                    .map(|doc| doc.data.clone())
                    .ok_or_else(|| StorageError::DocumentNotFound {
                        collection: collection.to_string(),
                        id: id.to_string(),
                    })?;
                for (path, value) in fields {
                    set_path(&mut data, &path, value);
                }
                data
            }
            WriteMode::MergeFields {
                data: patch,
                fields,
            } => {
                let mut data = existing.map(|doc| doc.data.clone()).unwrap_or_default();
                for path in &fields {
                    if let Some(value) = lookup_path(&patch, path) {
                        set_path(&mut data, path, value.clone());
                    }
                }
                data
            }
        };

        docs.insert(
            id.to_string(),
            StoredDocument {
                id: id.to_string(),
                data,
                create_time,
                update_time: now,
            },
        );

        Ok(WriteMeta { update_time: now })
    }

    #[instrument(skip(self))]
    async fn delete_document(
        &self,
        collection: &str,
        id: &str,
        precondition: Option<Precondition>,
    ) -> StorageResult<WriteMeta> {
        validate_collection_path(collection)?;
        validate_document_id(id)?;
        validate_precondition(None, precondition.as_ref())?;

        let now = Utc::now();
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        check_precondition(collection, id, docs.get(id), precondition.as_ref())?;
        docs.remove(id);

        Ok(WriteMeta { update_time: now })
    }
}
