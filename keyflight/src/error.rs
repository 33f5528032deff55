use std::sync::Arc;
use thiserror::Error;

pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Failure delivered to every caller attached to a fetch.
#[derive(Error, Debug)]
pub enum Error<E>
where
    E: std::error::Error + 'static,
{
    /// The fetch function failed. All waiters share the same allocation.
    #[error(transparent)]
    Fetch(Arc<E>),
    /// The fetch task ended without an outcome (it panicked or the runtime dropped it).
    #[error("fetch was abandoned before producing an outcome")]
    Abandoned,
}

impl<E> Error<E>
where
    E: std::error::Error + 'static,
{
    /// Returns the fetch failure, if this is one.
    pub fn fetch_error(&self) -> Option<&Arc<E>> {
        match self {
            Error::Fetch(err) => Some(err),
            Error::Abandoned => None,
        }
    }
}

impl<E> Clone for Error<E>
where
    E: std::error::Error + 'static,
{
    fn clone(&self) -> Self {
        match self {
            Error::Fetch(err) => Error::Fetch(Arc::clone(err)),
            Error::Abandoned => Error::Abandoned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Error, Debug)]
    #[error("backend unavailable: {0}")]
    struct Unavailable(&'static str);

    #[test]
    fn fetch_error_is_transparent() {
        let err = Error::Fetch(Arc::new(Unavailable("db-1")));
        assert_eq!(err.to_string(), "backend unavailable: db-1");
        assert!(err.fetch_error().is_some());
    }

    #[test]
    fn clone_shares_failure() {
        let err = Error::Fetch(Arc::new(Unavailable("db-1")));
        let cloned = err.clone();
        match (&err, &cloned) {
            (Error::Fetch(a), Error::Fetch(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected fetch errors"),
        }
        assert!(Error::<Unavailable>::Abandoned.fetch_error().is_none());
    }
}
