//! Request-scoped batching and caching of keyed loads.
//!
//! A [`Loader`] collects the keys requested by concurrent `load` calls into a
//! batch group, resolves the whole group with a single [`BatchFn`] call, and
//! keeps the settled results for the rest of its lifetime. A [`LoaderScope`]
//! owns the loaders of one unit of work and hands out the same loader for the
//! same identity.
//!
//! # Batching Window
//!
//! A group opens on the first cache miss and is flushed by the first of its
//! callers to resume after yielding to the executor. Loads from futures that
//! are polled together (`join_all`, `tokio::join!`) therefore share one batch
//! call, while a load issued after an `.await` on a backend call starts a new
//! group:
//!
//! ```text
//!   load(a) ─┐
//!   load(b) ─┼─ one group ─▶ batch_fn([a, b, c]) ─▶ results fanned out
//!   load(a) ─┤                                       and cached
//!   load(c) ─┘
//! ```
//!
//! # Cache Semantics
//!
//! - Absence is a value (`Ok(None)` for document lookups), never an error.
//! - Failed loads are not cached; the next load retries the backend.
//! - `prime` may store any result, including an error.
//! - `clear` and `prime` detach a fetch that is already in flight: its
//!   waiters still receive the fetched result, but it is not written back.

mod batch_fn;
mod config;
mod engine;
mod scope;
mod slots;

pub use batch_fn::BatchFn;
pub use config::LoaderConfig;
pub use engine::Loader;
pub use scope::LoaderScope;

/// Registers loader metrics descriptions.
///
/// Call once during application startup to describe the counters to the
/// installed metrics recorder.
///
/// # Metrics Registered
///
/// - `docbatch_loader_cache_hits_total` - Loads served from the settled cache
/// - `docbatch_loader_cache_misses_total` - Loads that had to join a batch
/// - `docbatch_loader_batches_total` - Batch groups dispatched
pub fn register_loader_metrics() {
    metrics::describe_counter!(
        "docbatch_loader_cache_hits_total",
        "Total number of loads served from the settled cache"
    );
    metrics::describe_counter!(
        "docbatch_loader_cache_misses_total",
        "Total number of loads that joined a batch group"
    );
    metrics::describe_counter!(
        "docbatch_loader_batches_total",
        "Total number of batch groups dispatched"
    );
}
