//! One-shot outcome cell shared between a fetch task and its waiters.

use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::watch;

type Slot<V, E> = Option<core::result::Result<V, Arc<E>>>;

pub(crate) fn channel<V, E>() -> (Publisher<V, E>, Outcome<V, E>) {
    let (tx, rx) = watch::channel(None);
    (Publisher(tx), Outcome(rx))
}

/// Write side, owned by the fetch task. Dropping it unpublished abandons the fetch.
pub(crate) struct Publisher<V, E>(watch::Sender<Slot<V, E>>);

impl<V, E> Publisher<V, E> {
    pub(crate) fn publish(self, result: core::result::Result<V, E>) {
        self.0.send_replace(Some(result.map_err(Arc::new)));
    }
}

/// Read side. Cloned once per attached caller.
pub(crate) struct Outcome<V, E>(watch::Receiver<Slot<V, E>>);

impl<V, E> Clone for Outcome<V, E> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<V, E> Outcome<V, E>
where
    V: Clone,
    E: std::error::Error + 'static,
{
    /// Waits for the outcome, or returns immediately if it is already there.
    pub(crate) async fn wait(mut self) -> Result<V, E> {
        let slot = match self.0.wait_for(Option::is_some).await {
            Ok(published) => published.clone(),
            Err(_) => return Err(Error::Abandoned),
        };
        match slot {
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) => Err(Error::Fetch(err)),
            None => Err(Error::Abandoned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Failed;

    impl fmt::Display for Failed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("failed")
        }
    }

    impl std::error::Error for Failed {}

    #[tokio::test]
    async fn waiters_before_and_after_publish_see_value() {
        let (publisher, outcome) = channel::<u32, Failed>();
        let early = tokio::spawn(outcome.clone().wait());
        publisher.publish(Ok(42));
        assert_eq!(early.await.expect("join").expect("value"), 42);
        assert_eq!(outcome.wait().await.expect("value"), 42);
    }

    #[tokio::test]
    async fn failure_is_shared() {
        let (publisher, outcome) = channel::<u32, Failed>();
        publisher.publish(Err(Failed));
        let a = outcome.clone().wait().await.expect_err("failure");
        let b = outcome.wait().await.expect_err("failure");
        assert!(Arc::ptr_eq(a.fetch_error().expect("fetch"), b.fetch_error().expect("fetch")));
    }

    #[tokio::test]
    async fn dropped_publisher_abandons() {
        let (publisher, outcome) = channel::<u32, Failed>();
        drop(publisher);
        assert!(matches!(outcome.wait().await, Err(Error::Abandoned)));
    }
}
