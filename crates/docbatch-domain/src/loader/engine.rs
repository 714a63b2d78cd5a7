//! Batched keyed cache implementation.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::{join_all, try_join_all};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use super::batch_fn::BatchFn;
use super::config::LoaderConfig;
use super::slots::{Outcome, SlotMap};
use crate::error::LoaderError;

/// Keys collected for one fused batch call, with the sender for each
/// registration. A key may appear twice if it was re-registered after being
/// primed and cleared while the group was open.
struct OpenBatch<K, V, E> {
    id: u64,
    entries: Vec<(K, broadcast::Sender<Outcome<V, E>>)>,
}

struct LoaderState<K, V, E> {
    /// Settled results. Only successful results are written back by fetches.
    settled: HashMap<K, Outcome<V, E>>,
    slots: SlotMap<K, V, E>,
    open: Option<OpenBatch<K, V, E>>,
    next_batch_id: u64,
}

impl<K, V, E> LoaderState<K, V, E> {
    fn open_batch_id(&self) -> Option<u64> {
        self.open.as_ref().map(|batch| batch.id)
    }
}

/// How a `load` call takes part in resolving its key.
enum Acquired<V, E> {
    /// Served from the settled cache.
    Settled(Outcome<V, E>),
    /// Registered in (or joined) the open batch; the caller may flush it.
    Member {
        batch_id: u64,
        receiver: broadcast::Receiver<Outcome<V, E>>,
    },
    /// The key is already being fetched by a dispatched batch.
    Follower(broadcast::Receiver<Outcome<V, E>>),
}

/// Request-scoped cache that fuses concurrent loads into batch calls.
///
/// Every `load` issued before the calling task next yields to the executor
/// lands in the same batch group, and the group's deduplicated keys are passed
/// to the [`BatchFn`] once. Results are delivered to every waiter and
/// successful ones are kept until cleared, re-primed, or the loader is dropped.
/// There is no TTL or capacity eviction.
///
/// # Thread Safety
///
/// The settled cache, the in-flight slots and the open group sit behind one
/// mutex that is never held across an `.await`, so a key requested while its
/// fetch is outstanding always joins that fetch.
pub struct Loader<K, F>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: BatchFn<K>,
{
    batch_fn: F,
    config: LoaderConfig,
    state: Mutex<LoaderState<K, F::Value, F::Error>>,
}

impl<K, F> std::fmt::Debug for Loader<K, F>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: BatchFn<K>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Loader")
            .field("config", &self.config)
            .field("settled", &state.settled.len())
            .field("pending", &state.slots.len())
            .finish()
    }
}

impl<K, F> Loader<K, F>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: BatchFn<K>,
{
    /// Creates a loader with the default configuration.
    pub fn new(batch_fn: F) -> Self {
        Self::with_config(batch_fn, LoaderConfig::default())
    }

    /// Creates a loader with the given configuration.
    pub fn with_config(batch_fn: F, config: LoaderConfig) -> Self {
        Self {
            batch_fn,
            config,
            state: Mutex::new(LoaderState {
                settled: HashMap::new(),
                slots: SlotMap::new(),
                open: None,
                next_batch_id: 0,
            }),
        }
    }

    /// Returns the configuration for this loader.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Returns the batch function backing this loader.
    pub fn batch_fn(&self) -> &F {
        &self.batch_fn
    }

    /// Returns the number of settled cache entries.
    pub fn entry_count(&self) -> usize {
        self.state().settled.len()
    }

    fn state(&self) -> MutexGuard<'_, LoaderState<K, F::Value, F::Error>> {
        // The state stays consistent across a panic in another holder: every
        // critical section is a handful of map operations.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the value for `key`.
    ///
    /// Returns the settled result if there is one; otherwise waits for the
    /// batch group that fetches `key`.
    pub async fn load(&self, key: K) -> Result<F::Value, F::Error> {
        loop {
            let mut receiver = match self.acquire(&key) {
                Acquired::Settled(result) => return result,
                Acquired::Follower(receiver) => receiver,
                Acquired::Member { batch_id, receiver } => {
                    for _ in 0..self.config.yield_count.max(1) {
                        tokio::task::yield_now().await;
                    }
                    // The first member to resume flushes the group.
                    if let Some(batch) = self.take_open_batch(batch_id) {
                        self.dispatch(batch).await;
                    }
                    receiver
                }
            };

            match receiver.recv().await {
                Ok(result) => return result,
                // The dispatching caller was dropped before the batch call
                // finished; its slots are gone, so start over.
                Err(_) => {
                    debug!("batch dispatcher dropped before completion, retrying load");
                    continue;
                }
            }
        }
    }

    /// Loads several keys, returning one result per key in input order.
    ///
    /// All keys join the same batch group; one key's failure does not affect
    /// the others.
    pub async fn load_many<I>(&self, keys: I) -> Vec<Result<F::Value, F::Error>>
    where
        I: IntoIterator<Item = K>,
    {
        join_all(keys.into_iter().map(|key| self.load(key))).await
    }

    /// Drops the settled entry for `key`.
    ///
    /// A fetch already in flight for `key` still resolves for its waiters but
    /// is no longer written back, and later loads start a fresh fetch.
    pub fn clear(&self, key: &K) -> &Self {
        let mut state = self.state();
        state.settled.remove(key);
        let open = state.open_batch_id();
        state.slots.detach_dispatched(key, open);
        self
    }

    /// Drops every settled entry. In-flight fetches still resolve for their
    /// waiters but are not written back.
    pub fn clear_all(&self) -> &Self {
        let mut state = self.state();
        state.settled.clear();
        let open = state.open_batch_id();
        state.slots.detach_all_dispatched(open);
        self
    }

    /// Stores `result` for `key`, replacing any settled entry, without a
    /// backend call. A fetch in flight for `key` will not overwrite it.
    ///
    /// Does nothing when caching is disabled.
    pub fn prime(&self, key: K, result: Result<F::Value, F::Error>) -> &Self {
        if !self.config.cache_enabled {
            return self;
        }
        let mut state = self.state();
        state.slots.detach(&key);
        state.settled.insert(key, result);
        self
    }

    fn acquire(&self, key: &K) -> Acquired<F::Value, F::Error> {
        let mut state = self.state();

        if let Some(result) = state.settled.get(key) {
            trace!("loader cache hit");
            metrics::counter!("docbatch_loader_cache_hits_total").increment(1);
            return Acquired::Settled(result.clone());
        }
        metrics::counter!("docbatch_loader_cache_misses_total").increment(1);

        let open = state.open_batch_id();
        if let Some((batch_id, receiver)) = state.slots.join(key) {
            return if Some(batch_id) == open {
                Acquired::Member { batch_id, receiver }
            } else {
                Acquired::Follower(receiver)
            };
        }

        let batch_id = match open {
            Some(id) => id,
            None => {
                let id = state.next_batch_id;
                state.next_batch_id += 1;
                state.open = Some(OpenBatch {
                    id,
                    entries: Vec::new(),
                });
                id
            }
        };

        let (sender, receiver) = state.slots.register(key.clone(), batch_id);
        if let Some(batch) = state.open.as_mut() {
            batch.entries.push((key.clone(), sender));
        }
        Acquired::Member { batch_id, receiver }
    }

    fn take_open_batch(&self, batch_id: u64) -> Option<OpenBatch<K, F::Value, F::Error>> {
        let mut state = self.state();
        if state.open_batch_id() == Some(batch_id) {
            state.open.take()
        } else {
            None
        }
    }

    async fn dispatch(&self, batch: OpenBatch<K, F::Value, F::Error>) {
        let guard = DispatchGuard {
            loader: self,
            entries: &batch.entries,
            completed: false,
        };

        // Deduplicate in registration order.
        let mut index: HashMap<K, usize> = HashMap::with_capacity(batch.entries.len());
        let mut keys: Vec<K> = Vec::with_capacity(batch.entries.len());
        for (key, _) in &batch.entries {
            index.entry(key.clone()).or_insert_with(|| {
                keys.push(key.clone());
                keys.len() - 1
            });
        }

        debug!(batch_id = batch.id, keys = keys.len(), "dispatching batch");
        metrics::counter!("docbatch_loader_batches_total").increment(1);

        let outcome = self.call_batch_fn(&keys).await;

        let mut state = self.state();
        match outcome {
            Ok(results) => {
                for (key, sender) in &batch.entries {
                    let Some(result) = index.get(key).and_then(|&i| results.get(i)) else {
                        continue;
                    };
                    let still_attached = state.slots.release(key, sender);
                    if still_attached && self.config.cache_enabled && result.is_ok() {
                        state.settled.insert(key.clone(), result.clone());
                    }
                    // No receivers left is fine.
                    let _ = sender.send(result.clone());
                }
            }
            Err(err) => {
                warn!(batch_id = batch.id, keys = keys.len(), "batch load failed");
                for (key, sender) in &batch.entries {
                    state.slots.release(key, sender);
                    let _ = sender.send(Err(err.clone()));
                }
            }
        }
        drop(state);

        guard.complete();
    }

    /// Invokes the batch function, splitting `keys` by `max_batch_size`.
    async fn call_batch_fn(
        &self,
        keys: &[K],
    ) -> Result<Vec<Outcome<F::Value, F::Error>>, F::Error> {
        let chunk_size = self
            .config
            .max_batch_size
            .filter(|&size| size > 0)
            .unwrap_or(keys.len())
            .max(1);

        let calls = keys.chunks(chunk_size).map(|chunk| async move {
            let results = self.batch_fn.load(chunk).await?;
            if results.len() != chunk.len() {
                return Err(F::Error::from(LoaderError::BatchSizeMismatch {
                    expected: chunk.len(),
                    actual: results.len(),
                }));
            }
            Ok::<_, F::Error>(results)
        });

        let chunks = try_join_all(calls).await?;
        Ok(chunks.into_iter().flatten().collect())
    }
}

/// Releases a batch's slots if its dispatch future is dropped before
/// completing, so waiters observe a closed channel and retry.
struct DispatchGuard<'a, K, F>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: BatchFn<K>,
{
    loader: &'a Loader<K, F>,
    entries: &'a [(K, broadcast::Sender<Outcome<F::Value, F::Error>>)],
    completed: bool,
}

impl<K, F> DispatchGuard<'_, K, F>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: BatchFn<K>,
{
    /// Mark as completed (normal path).
    fn complete(mut self) {
        self.completed = true;
    }
}

impl<K, F> Drop for DispatchGuard<'_, K, F>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    F: BatchFn<K>,
{
    fn drop(&mut self) {
        if !self.completed {
            let mut state = self.loader.state();
            for (key, sender) in self.entries {
                state.slots.release(key, sender);
            }
        }
    }
}
