use super::outcome::{self, Outcome, Publisher};
use super::Inner;
use crate::error::Result;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Coordinates the single fetch for one key.
///
/// The local gate only guards the `Unstarted -> Pending` transition. It is
/// never held while the fetch runs or while talking to the registry.
pub(crate) struct KeyResolver<K, V, E> {
    key: K,
    registry: Weak<Inner<K, V, E>>,
    label: Arc<str>,
    pending: Mutex<Option<Outcome<V, E>>>,
}

impl<K, V, E> KeyResolver<K, V, E>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    pub(crate) fn new(key: K, registry: Weak<Inner<K, V, E>>, label: Arc<str>) -> Self {
        Self { key, registry, label, pending: Mutex::new(None) }
    }

    /// Starts `fetch` if nobody has yet, then waits for the shared outcome.
    pub(crate) fn resolve_once<F, Fut>(
        self: &Arc<Self>,
        fetch: F,
    ) -> impl Future<Output = Result<V, E>> + Send + 'static
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = core::result::Result<V, E>> + Send + 'static,
    {
        self.attach(fetch).wait()
    }

    fn attach<F, Fut>(self: &Arc<Self>, fetch: F) -> Outcome<V, E>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = core::result::Result<V, E>> + Send + 'static,
    {
        let (publisher, outcome) = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(outcome) = pending.as_ref() {
                tracing::trace!(registry = %self.label, key = ?self.key, "joining in-flight fetch");
                return outcome.clone();
            }
            let (publisher, outcome) = outcome::channel();
            *pending = Some(outcome.clone());
            (publisher, outcome)
        };

        tracing::debug!(registry = %self.label, key = ?self.key, "starting fetch");
        // Armed before `fetch` runs so a panicking supplier still deregisters.
        let completion = Completion { resolver: Arc::clone(self), publisher: Some(publisher) };
        let fut = fetch(self.key.clone());
        tokio::spawn(async move {
            let result = fut.await;
            completion.finish(result);
        });
        outcome
    }

    fn deregister(self: &Arc<Self>) {
        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(&self.key, self);
        }
    }
}

/// Owned by the fetch task. Deregisters exactly once, always before waiters
/// can observe the outcome.
struct Completion<K, V, E>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    resolver: Arc<KeyResolver<K, V, E>>,
    publisher: Option<Publisher<V, E>>,
}

impl<K, V, E> Completion<K, V, E>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    fn finish(mut self, result: core::result::Result<V, E>) {
        let Some(publisher) = self.publisher.take() else {
            return;
        };
        self.resolver.deregister();
        tracing::debug!(
            registry = %self.resolver.label,
            key = ?self.resolver.key,
            ok = result.is_ok(),
            "fetch completed"
        );
        publisher.publish(result);
    }
}

impl<K, V, E> Drop for Completion<K, V, E>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(publisher) = self.publisher.take() {
            self.resolver.deregister();
            tracing::warn!(
                registry = %self.resolver.label,
                key = ?self.resolver.key,
                "fetch abandoned without an outcome"
            );
            drop(publisher);
        }
    }
}
