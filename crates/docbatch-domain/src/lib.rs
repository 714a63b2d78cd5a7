//! docbatch-domain: Batching and caching engine
//!
//! This crate contains the backend-agnostic core of docbatch:
//! - Batched keyed cache (`Loader`)
//! - Batch function contract (`BatchFn`)
//! - Per-unit-of-work loader registry (`LoaderScope`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               docbatch-domain                │
//! ├─────────────────────────────────────────────┤
//! │  loader/  - Batching, caching, scopes       │
//! │  error.rs - Loader errors                   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod loader;

// Re-export commonly used types at the crate root
pub use error::{LoaderError, LoaderResult};
pub use loader::{BatchFn, Loader, LoaderConfig, LoaderScope};
