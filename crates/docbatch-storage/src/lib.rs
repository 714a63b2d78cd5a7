//! docbatch-storage: Document store abstraction layer
//!
//! This crate provides the backend contract consumed by docbatch, including:
//! - DocumentStore trait for fetch, query, write and delete
//! - Query, precondition and write-mode types
//! - In-memory implementation for testing
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              docbatch-storage                │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - DocumentStore trait & types  │
//! │  memory.rs   - In-memory implementation     │
//! │  error.rs    - StorageError                 │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::MemoryDocumentStore;
pub use traits::{
    validate_collection_path, validate_document_id, validate_precondition, validate_query,
    validate_write_mode, Direction, DocumentData, DocumentStore, FieldFilter, FieldRef, FilterOp,
    Precondition, Query, StoredDocument, WriteMeta, WriteMode, MAX_IN_FILTER_SIZE,
};
