//! Typed documents.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use docbatch_storage::{DocumentData, StoredDocument};

use crate::error::{RepositoryError, RepositoryResult};

/// A document of one collection, with its payload decoded into `A`.
///
/// The id lives beside the payload and is never stored inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document<A> {
    pub id: String,
    pub data: A,
}

impl<A> Document<A> {
    pub fn new(id: impl Into<String>, data: A) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

impl<A: DeserializeOwned> Document<A> {
    /// Decodes a stored document read from `collection`.
    pub(crate) fn decode(collection: &str, stored: &StoredDocument) -> RepositoryResult<Self> {
        let data = serde_json::from_value(Value::Object(stored.data.clone())).map_err(|e| {
            RepositoryError::Decode {
                collection: collection.to_string(),
                id: stored.id.clone(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            id: stored.id.clone(),
            data,
        })
    }
}

impl<A: Serialize> Document<A> {
    /// Encodes the payload as the raw map written to `collection`.
    pub(crate) fn encode(&self, collection: &str) -> RepositoryResult<DocumentData> {
        let encode_error = |message: String| RepositoryError::Encode {
            collection: collection.to_string(),
            id: self.id.clone(),
            message,
        };

        match serde_json::to_value(&self.data).map_err(|e| encode_error(e.to_string()))? {
            Value::Object(map) => Ok(map),
            other => Err(encode_error(format!(
                "document data must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
