//! Async lookup trait and its coalescing adapter.
mod coalesced_resolver;

pub use self::coalesced_resolver::CoalescedResolver;
use crate::registry::RegistryConfig;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

#[trait_variant::make(Send)]
pub trait Resolver<E>
where
    E: std::error::Error,
{
    type Input: ?Sized;
    type Output;

    fn resolve(
        &self,
        input: &Self::Input,
    ) -> impl Future<Output = core::result::Result<Option<Self::Output>, E>>;
}

/// Wraps a [`Resolver`] so that concurrent identical inputs share one lookup.
pub trait Coalesceable<E>
where
    Self: Sized + Resolver<E>,
    Self::Input: Sized,
    E: std::error::Error,
{
    fn coalesced(self) -> CoalescedResolver<Self, E>;
    fn coalesced_with(self, config: RegistryConfig) -> CoalescedResolver<Self, E>;
}

impl<R, E> Coalesceable<E> for R
where
    R: Sized + Resolver<E>,
    R::Input: Clone + Hash + Eq + Debug + Send + Sync + 'static,
    R::Output: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    fn coalesced(self) -> CoalescedResolver<Self, E> {
        CoalescedResolver::new(self, RegistryConfig::default())
    }

    fn coalesced_with(self, config: RegistryConfig) -> CoalescedResolver<Self, E> {
        CoalescedResolver::new(self, config)
    }
}
