//! DocumentStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{StorageError, StorageResult};

/// Maximum number of values accepted by an `In` filter.
///
/// The backend rejects equality-set filters with more values than this, so
/// id-set lookups larger than this must be split by the caller.
pub const MAX_IN_FILTER_SIZE: usize = 10;

/// Maximum length of a document id in bytes.
pub const MAX_DOCUMENT_ID_LENGTH: usize = 1500;

/// Raw document payload as held by the backend.
pub type DocumentData = serde_json::Map<String, Value>;

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: DocumentData,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// Metadata returned by a successful write or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMeta {
    pub update_time: DateTime<Utc>,
}

/// How a write applies its payload to the target document.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteMode {
    /// Replace the whole document, creating it if missing.
    Replace(DocumentData),
    /// Deep-merge the patch into the document, creating it if missing.
    Merge(DocumentData),
    /// Set individual dotted field paths (e.g. `"y.z"`). The document must exist.
    UpdatePaths(DocumentData),
    /// Copy only the listed dotted field paths from `data` into the document,
    /// creating it if missing. Every listed path must be present in `data`;
    /// fields not listed are left untouched.
    MergeFields {
        data: DocumentData,
        fields: Vec<String>,
    },
}

impl WriteMode {
    /// Returns the mode name used in errors and log fields.
    pub fn name(&self) -> &'static str {
        match self {
            WriteMode::Replace(_) => "replace",
            WriteMode::Merge(_) => "merge",
            WriteMode::UpdatePaths(_) => "update_paths",
            WriteMode::MergeFields { .. } => "merge_fields",
        }
    }
}

/// Condition that must hold on the stored document for a mutation to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Precondition {
    /// Require the document to exist (`true`) or not exist (`false`).
    pub exists: Option<bool>,
    /// Require the document's last update time to match exactly.
    pub last_update_time: Option<DateTime<Utc>>,
}

impl Precondition {
    /// Precondition on document existence.
    pub fn exists(exists: bool) -> Self {
        Self {
            exists: Some(exists),
            last_update_time: None,
        }
    }

    /// Precondition on the document's last update time.
    pub fn last_update_time(time: DateTime<Utc>) -> Self {
        Self {
            exists: None,
            last_update_time: Some(time),
        }
    }

    /// Returns true if no condition is set.
    pub fn is_empty(&self) -> bool {
        self.exists.is_none() && self.last_update_time.is_none()
    }
}

/// Field a filter or ordering applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    /// The document id.
    DocumentId,
    /// A dotted path into the document data.
    Path(String),
}

impl FieldRef {
    pub fn path(path: impl Into<String>) -> Self {
        FieldRef::Path(path.into())
    }
}

/// Filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    /// Matches when the field equals any element of the array value.
    In,
}

/// A single field filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: FieldRef,
    pub op: FilterOp,
    pub value: Value,
}

/// Sort direction for `order_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A query over one collection. Filters are combined with AND.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub order_by: Vec<(FieldRef, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    /// Creates a query matching every document in the collection.
    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            collection: path.into(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Adds an equality filter on a field path.
    pub fn where_eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: FieldRef::path(path),
            op: FilterOp::Equal,
            value: value.into(),
        });
        self
    }

    /// Adds an equality-set filter on a field path.
    pub fn where_in<I, V>(mut self, path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filters.push(FieldFilter {
            field: FieldRef::path(path),
            op: FilterOp::In,
            value: Value::Array(values.into_iter().map(Into::into).collect()),
        });
        self
    }

    /// Adds an equality-set filter on the document id.
    pub fn where_id_in<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filters.push(FieldFilter {
            field: FieldRef::DocumentId,
            op: FilterOp::In,
            value: Value::Array(
                ids.into_iter()
                    .map(|id| Value::String(id.as_ref().to_string()))
                    .collect(),
            ),
        });
        self
    }

    /// Appends an ordering clause.
    pub fn order_by(mut self, field: FieldRef, direction: Direction) -> Self {
        self.order_by.push((field, direction));
        self
    }

    /// Caps the number of returned documents.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Validates a collection path.
///
/// Paths alternate collection and document segments and must end on a
/// collection: `users` and `users/alice/posts` are valid, `users/alice` is not.
pub fn validate_collection_path(path: &str) -> StorageResult<()> {
    if path.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "collection path cannot be empty".to_string(),
        });
    }
    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StorageError::InvalidInput {
            message: format!("collection path contains an empty segment: {path}"),
        });
    }
    if segments.len() % 2 == 0 {
        return Err(StorageError::InvalidInput {
            message: format!("path does not point at a collection: {path}"),
        });
    }
    Ok(())
}

/// Validates a document id.
pub fn validate_document_id(id: &str) -> StorageResult<()> {
    if id.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "document id cannot be empty".to_string(),
        });
    }
    if id.contains('/') {
        return Err(StorageError::InvalidInput {
            message: format!("document id cannot contain '/': {id}"),
        });
    }
    if id.len() > MAX_DOCUMENT_ID_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!(
                "document id exceeds {MAX_DOCUMENT_ID_LENGTH} bytes (got {})",
                id.len()
            ),
        });
    }
    Ok(())
}

/// Validates a query's filters against backend limits.
pub fn validate_query(query: &Query) -> StorageResult<()> {
    validate_collection_path(&query.collection)?;

    for filter in &query.filters {
        if let FieldRef::Path(path) = &filter.field {
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(StorageError::InvalidFilter {
                    message: format!("invalid field path: {path:?}"),
                });
            }
        }

        let values: &[Value] = match filter.op {
            FilterOp::In => {
                let values = filter.value.as_array().ok_or_else(|| {
                    StorageError::InvalidFilter {
                        message: "'in' filter requires an array value".to_string(),
                    }
                })?;
                if values.is_empty() {
                    return Err(StorageError::InvalidFilter {
                        message: "'in' filter requires a non-empty array".to_string(),
                    });
                }
                if values.len() > MAX_IN_FILTER_SIZE {
                    return Err(StorageError::InvalidFilter {
                        message: format!(
                            "'in' filter supports up to {MAX_IN_FILTER_SIZE} values, got {}",
                            values.len()
                        ),
                    });
                }
                values
            }
            FilterOp::Equal => std::slice::from_ref(&filter.value),
        };

        if filter.field == FieldRef::DocumentId && values.iter().any(|v| !v.is_string()) {
            return Err(StorageError::InvalidFilter {
                message: "document id filters require string values".to_string(),
            });
        }
    }

    Ok(())
}

/// Looks up a dotted field path in document data.
pub(crate) fn lookup_path<'a>(data: &'a DocumentData, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = data.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Validates a write's payload.
///
/// A field-masked merge needs at least one well-formed field path, and each
/// path must resolve to a value in the payload.
pub fn validate_write_mode(mode: &WriteMode) -> StorageResult<()> {
    let WriteMode::MergeFields { data, fields } = mode else {
        return Ok(());
    };
    if fields.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "merge_fields requires at least one field path".to_string(),
        });
    }
    for field in fields {
        if field.is_empty() || field.split('.').any(str::is_empty) {
            return Err(StorageError::InvalidInput {
                message: format!("invalid field path: {field:?}"),
            });
        }
        if lookup_path(data, field).is_none() {
            return Err(StorageError::InvalidInput {
                message: format!("merge_fields lists '{field}' but the data has no value for it"),
            });
        }
    }
    Ok(())
}

/// Validates that a precondition is supported for the given mutation.
///
/// `mode` is `None` for deletes. At most one of `exists` and
/// `last_update_time` may be set, and only field updates and deletes accept a
/// precondition at all.
pub fn validate_precondition(
    mode: Option<&WriteMode>,
    precondition: Option<&Precondition>,
) -> StorageResult<()> {
    let Some(precondition) = precondition.filter(|p| !p.is_empty()) else {
        return Ok(());
    };

    if precondition.exists.is_some() && precondition.last_update_time.is_some() {
        return Err(StorageError::InvalidInput {
            message: "precondition may set either exists or last_update_time, not both"
                .to_string(),
        });
    }

    match mode {
        None | Some(WriteMode::UpdatePaths(_)) => Ok(()),
        Some(mode) => Err(StorageError::InvalidInput {
            message: format!(
                "{} writes do not accept a precondition; use a field update",
                mode.name()
            ),
        }),
    }
}

/// Abstract interface to a hierarchical document database.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetches the documents whose ids are in `ids`.
    ///
    /// Missing ids are simply absent from the result; result order is
    /// unspecified. Implementations reject more than [`MAX_IN_FILTER_SIZE`] ids.
    async fn fetch_by_id_set(
        &self,
        collection: &str,
        ids: &[String],
    ) -> StorageResult<Vec<StoredDocument>> {
        let query = Query::collection(collection).where_id_in(ids);
        self.fetch_by_query(&query).await
    }

    /// Runs a query.
    async fn fetch_by_query(&self, query: &Query) -> StorageResult<Vec<StoredDocument>>;

    /// Writes a document.
    async fn write_document(
        &self,
        collection: &str,
        id: &str,
        mode: WriteMode,
        precondition: Option<Precondition>,
    ) -> StorageResult<WriteMeta>;

    /// Deletes a document. Deleting a missing document succeeds unless a
    /// precondition says otherwise.
    async fn delete_document(
        &self,
        collection: &str,
        id: &str,
        precondition: Option<Precondition>,
    ) -> StorageResult<WriteMeta>;
}
