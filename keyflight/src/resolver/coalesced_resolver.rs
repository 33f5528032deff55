use super::Resolver;
use crate::error::Error;
use crate::registry::{Registry, RegistryConfig};
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

/// A [`Resolver`] that routes every lookup through a [`Registry`].
///
/// Lookups for the same input that overlap in time reach the inner resolver
/// once. Nothing is cached: a lookup issued after the previous one finished
/// reaches the inner resolver again.
pub struct CoalescedResolver<R, E>
where
    R: Resolver<E>,
    R::Input: Sized,
    E: std::error::Error,
{
    resolver: Arc<R>,
    registry: Registry<R::Input, Option<R::Output>, E>,
    _error: PhantomData<fn() -> E>,
}

impl<R, E> CoalescedResolver<R, E>
where
    R: Resolver<E>,
    R::Input: Clone + Hash + Eq + Debug + Send + Sync + 'static,
    R::Output: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new(resolver: R, config: RegistryConfig) -> Self {
        Self {
            resolver: Arc::new(resolver),
            registry: Registry::with_config(config),
            _error: PhantomData,
        }
    }

    /// The registry tracking lookups currently in flight.
    pub fn registry(&self) -> &Registry<R::Input, Option<R::Output>, E> {
        &self.registry
    }
}

impl<R, E> Resolver<Error<E>> for CoalescedResolver<R, E>
where
    R: Resolver<E> + Send + Sync + 'static,
    R::Input: Clone + Hash + Eq + Debug + Send + Sync + 'static,
    R::Output: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Input = R::Input;
    type Output = R::Output;

    async fn resolve(
        &self,
        input: &Self::Input,
    ) -> core::result::Result<Option<Self::Output>, Error<E>> {
        let resolver = Arc::clone(&self.resolver);
        self.registry
            .resolve(input.clone(), move |input| async move { resolver.resolve(&input).await })
            .await
    }
}
