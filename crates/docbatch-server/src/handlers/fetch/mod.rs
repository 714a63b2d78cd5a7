//! Chunked id-set fetching.
//!
//! The backend's equality-set ("IN") filter accepts a bounded number of
//! values, so a batch of document ids is split into chunks that are fetched
//! concurrently and merged back into one result per requested id.
//!
//! 1. **Chunking**: at most `max_in_filter_size` ids per backend call
//! 2. **Fatal chunks**: any failing chunk fails the whole batch
//! 3. **Merge**: documents are matched to ids, first occurrence wins

mod fetcher;

pub use fetcher::ChunkedIdFetcher;
