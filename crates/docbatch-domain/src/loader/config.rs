//! Loader configuration.

/// Configuration for a [`Loader`](super::Loader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// How many times a registering caller yields to the executor before
    /// flushing its batch group. Loads issued by other futures of the same
    /// task during that window join the group. Zero is treated as one, since
    /// a caller that never yields flushes a group nobody else could join.
    pub yield_count: usize,
    /// Upper bound on keys per batch-function call. Larger groups are split
    /// into several concurrent calls. `None` means unbounded.
    pub max_batch_size: Option<usize>,
    /// Whether results are kept after they settle.
    ///
    /// With caching disabled the loader still batches and deduplicates keys
    /// that are in flight together, but every later load goes to the backend.
    pub cache_enabled: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            yield_count: 1,
            max_batch_size: None,
            cache_enabled: true,
        }
    }
}

impl LoaderConfig {
    /// Sets the yield count, clamped to at least one.
    pub fn with_yield_count(mut self, yield_count: usize) -> Self {
        self.yield_count = yield_count.max(1);
        self
    }

    /// Sets the maximum number of keys per batch-function call.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size);
        self
    }

    /// Enables or disables result caching.
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }
}
