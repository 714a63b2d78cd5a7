//! Per-unit-of-work loader registry.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::batch_fn::BatchFn;
use super::config::LoaderConfig;
use super::engine::Loader;
use crate::error::{LoaderError, LoaderResult};

type AnyLoader = Arc<dyn Any + Send + Sync>;

/// Owns the loaders of one unit of work (typically one request).
///
/// Loaders are created lazily and memoized by an application-supplied
/// identity, so repeated lookups against the same collection share one cache
/// and one batch window even when the batch function is rebuilt for every
/// call. Dropping the scope drops every loader it created; two scopes never
/// share cached state.
///
/// # Example
///
/// ```rust,ignore
/// let scope = LoaderScope::new();
/// let users = scope.get_or_create("users", || UserBatch::new(store.clone()))?;
/// let alice = users.load("alice".to_string()).await?;
/// ```
pub struct LoaderScope {
    config: LoaderConfig,
    loaders: Mutex<HashMap<String, AnyLoader>>,
}

impl std::fmt::Debug for LoaderScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loaders = self.loaders.lock().unwrap_or_else(PoisonError::into_inner);
        let mut identities: Vec<&String> = loaders.keys().collect();
        identities.sort();
        f.debug_struct("LoaderScope")
            .field("config", &self.config)
            .field("loaders", &identities)
            .finish()
    }
}

impl Default for LoaderScope {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderScope {
    /// Creates an empty scope whose loaders use the default configuration.
    pub fn new() -> Self {
        Self::with_config(LoaderConfig::default())
    }

    /// Creates an empty scope whose loaders use `config`.
    pub fn with_config(config: LoaderConfig) -> Self {
        Self {
            config,
            loaders: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configuration applied to loaders created by this scope.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Returns the loader registered under `identity`, creating it with the
    /// batch function from `make` on first use.
    ///
    /// `make` is only called when no loader exists yet. Reusing an identity
    /// with a different key or batch-function type is a configuration error.
    pub fn get_or_create<K, F>(
        &self,
        identity: &str,
        make: impl FnOnce() -> F,
    ) -> LoaderResult<Arc<Loader<K, F>>>
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        F: BatchFn<K>,
    {
        let mut loaders = self.loaders.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = loaders.get(identity) {
            return Arc::clone(existing)
                .downcast::<Loader<K, F>>()
                .map_err(|_| LoaderError::IdentityTypeMismatch {
                    identity: identity.to_string(),
                });
        }

        debug!(identity, "creating scoped loader");
        let loader = Arc::new(Loader::with_config(make(), self.config.clone()));
        loaders.insert(identity.to_string(), Arc::clone(&loader) as AnyLoader);
        Ok(loader)
    }

    /// Like [`get_or_create`](Self::get_or_create), keyed by the batch
    /// function's type name.
    ///
    /// Only suitable when a single loader of this batch-function type exists
    /// per scope; prefer an explicit identity such as a collection path.
    pub fn get_or_create_default<K, F>(
        &self,
        make: impl FnOnce() -> F,
    ) -> LoaderResult<Arc<Loader<K, F>>>
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        F: BatchFn<K>,
    {
        self.get_or_create(std::any::type_name::<F>(), make)
    }

    /// Returns true if a loader is registered under `identity`.
    pub fn contains(&self, identity: &str) -> bool {
        self.loaders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(identity)
    }

    /// Number of loaders created in this scope.
    pub fn len(&self) -> usize {
        self.loaders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no loader has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
