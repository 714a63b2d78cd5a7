//! docbatch-server: Cached document access
//!
//! This crate wires the batching engine to a document store:
//! - Chunked id-set fetching bounded by the store's IN-filter size
//! - Collections whose writes prime or clear the request's cache
//! - Configuration management
//! - Structured logging setup
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               docbatch-server                │
//! ├─────────────────────────────────────────────┤
//! │  config.rs        - Configuration           │
//! │  observability.rs - Logging setup           │
//! │  document.rs      - Typed documents         │
//! │  error.rs         - Repository errors       │
//! │  handlers/                                  │
//! │    fetch/         - Chunked id fetching     │
//! │    collection/    - Write-coupled caching   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let store = MemoryDocumentStore::new_shared();
//! let users: Collection<_, User> = Collection::new(store, "users")?;
//!
//! // One scope per request.
//! let scope = LoaderScope::new();
//! let (alice, bob) = tokio::join!(
//!     users.find_by_id(&scope, "alice"),
//!     users.find_by_id(&scope, "bob"),
//! );
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod handlers;
pub mod observability;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use config::{ConfigLoadError, DocbatchConfig};
pub use document::Document;
pub use error::{RepositoryError, RepositoryResult};
pub use handlers::{ChunkedIdFetcher, Collection};
