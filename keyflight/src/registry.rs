//! Key-indexed registry of in-flight fetches.
mod key_resolver;
mod outcome;

use self::key_resolver::KeyResolver;
use crate::error::Result;
use dashmap::{DashMap, Entry};
use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Number of keys the in-flight map is sized for up front.
    pub initial_capacity: usize,
    /// Tag attached to every log event emitted by the registry.
    pub label: Cow<'static, str>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { initial_capacity: 0, label: Cow::Borrowed("keyflight") }
    }
}

/// Coalesces concurrent fetches for the same key.
///
/// While a fetch for a key is running, every further [`resolve`](Registry::resolve)
/// for that key attaches to it instead of starting another one. Once the fetch
/// completes its entry is removed, so a later call fetches again. Clones share
/// the same in-flight map.
pub struct Registry<K, V, E> {
    inner: Arc<Inner<K, V, E>>,
}

pub(crate) struct Inner<K, V, E> {
    resolvers: DashMap<K, Arc<KeyResolver<K, V, E>>>,
    label: Arc<str>,
}

impl<K, V, E> Registry<K, V, E>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolvers: DashMap::with_capacity(config.initial_capacity),
                label: Arc::from(config.label.as_ref()),
            }),
        }
    }

    /// Resolves `key`, running `fetch` only if no fetch for `key` is in flight.
    ///
    /// The caller is attached to the key's fetch as soon as this method
    /// returns; the returned future only waits for the shared outcome. Every
    /// attached caller receives the same value, or a clone of the same
    /// [`Error::Fetch`](crate::Error::Fetch). Dropping the returned future does
    /// not cancel the fetch.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn resolve<F, Fut>(
        &self,
        key: K,
        fetch: F,
    ) -> impl Future<Output = Result<V, E>> + Send + 'static
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = core::result::Result<V, E>> + Send + 'static,
    {
        self.find_or_create(key).resolve_once(fetch)
    }

    /// Number of keys that currently have a fetch in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.resolvers.len()
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inner.resolvers.contains_key(key)
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    fn find_or_create(&self, key: K) -> Arc<KeyResolver<K, V, E>> {
        match self.inner.resolvers.entry(key) {
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            Entry::Vacant(vacant) => {
                let resolver = Arc::new(KeyResolver::new(
                    vacant.key().clone(),
                    Arc::downgrade(&self.inner),
                    Arc::clone(&self.inner.label),
                ));
                vacant.insert(Arc::clone(&resolver));
                resolver
            }
        }
    }
}

impl<K, V, E> Inner<K, V, E>
where
    K: Eq + Hash + Debug,
{
    /// Removes `key` only if it still maps to this exact `resolver`.
    pub(crate) fn deregister(&self, key: &K, resolver: &Arc<KeyResolver<K, V, E>>) -> bool {
        let removed =
            self.resolvers.remove_if(key, |_, current| Arc::ptr_eq(current, resolver)).is_some();
        if !removed {
            tracing::trace!(registry = %self.label, ?key, "resolver already replaced");
        }
        removed
    }
}

impl<K, V, E> Clone for Registry<K, V, E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K, V, E> Default for Registry<K, V, E>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> Debug for Registry<K, V, E>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("label", &self.inner.label)
            .field("in_flight", &self.inner.resolvers.len())
            .finish()
    }
}
