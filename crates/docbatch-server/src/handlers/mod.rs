//! Document access handlers.
//!
//! - `fetch`: batch function that reads documents by id in bounded chunks
//! - `collection`: typed collection access coupling writes to the cache

pub mod collection;
pub mod fetch;

pub use collection::Collection;
pub use fetch::ChunkedIdFetcher;
