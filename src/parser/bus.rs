//! Result bus: fan-out of parse results, failures and the dirty flag.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use super::worker::{ParseFailure, ParseResult};

/// Publishing side of a parser's signals.
///
/// Owned by the parser state; dropping it closes every subscription.
pub(crate) struct ResultBus<S, T> {
    results: broadcast::Sender<Arc<ParseResult<S, T>>>,
    failures: broadcast::Sender<ParseFailure>,
    dirty: watch::Sender<bool>,
    latest: Option<Arc<ParseResult<S, T>>>,
}

impl<S, T> ResultBus<S, T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let (results, _) = broadcast::channel(capacity);
        let (failures, _) = broadcast::channel(capacity);
        let (dirty, _) = watch::channel(false);
        Self {
            results,
            failures,
            dirty,
            latest: None,
        }
    }

    pub(crate) fn subscribe_results(&self) -> broadcast::Receiver<Arc<ParseResult<S, T>>> {
        self.results.subscribe()
    }

    pub(crate) fn subscribe_failures(&self) -> broadcast::Receiver<ParseFailure> {
        self.failures.subscribe()
    }

    pub(crate) fn subscribe_dirty(&self) -> watch::Receiver<bool> {
        self.dirty.subscribe()
    }

    pub(crate) fn latest(&self) -> Option<Arc<ParseResult<S, T>>> {
        self.latest.clone()
    }

    pub(crate) fn publish_result(&mut self, result: Arc<ParseResult<S, T>>) {
        self.latest = Some(Arc::clone(&result));
        // No subscribers is fine; `latest` still records it.
        let _ = self.results.send(result);
    }

    pub(crate) fn publish_failure(&self, failure: ParseFailure) {
        let _ = self.failures.send(failure);
    }

    /// Returns whether the value changed.
    pub(crate) fn publish_dirty(&self, dirty: bool) -> bool {
        self.dirty.send_if_modified(|current| {
            if *current == dirty {
                false
            } else {
                *current = dirty;
                true
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use std::time::Duration;

    fn result(seq: u64) -> Arc<ParseResult<u64, &'static str>> {
        Arc::new(ParseResult {
            seq,
            snapshot: Arc::new(seq),
            value: "ok",
            elapsed: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn test_results_fan_out_to_all_subscribers() {
        let mut bus = ResultBus::new(4);
        let mut first = bus.subscribe_results();
        let mut second = bus.subscribe_results();

        bus.publish_result(result(1));

        assert_eq!(first.recv().await.unwrap().seq, 1);
        assert_eq!(second.recv().await.unwrap().seq, 1);
        assert_eq!(bus.latest().unwrap().seq, 1);
    }

    #[tokio::test]
    async fn test_dirty_is_deduplicated() {
        let bus: ResultBus<u64, ()> = ResultBus::new(4);
        let mut rx = bus.subscribe_dirty();
        assert!(!*rx.borrow_and_update());

        assert!(bus.publish_dirty(true));
        assert!(!bus.publish_dirty(true));
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        assert!(!bus.publish_dirty(true));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_failures_are_delivered() {
        let bus: ResultBus<u64, ()> = ResultBus::new(4);
        let mut rx = bus.subscribe_failures();

        bus.publish_failure(ParseFailure {
            seq: 2,
            version: 7,
            error: WorkerError::failed("boom"),
            elapsed: Duration::from_millis(3),
        });

        let failure = rx.recv().await.unwrap();
        assert_eq!(failure.seq, 2);
        assert_eq!(failure.error, WorkerError::failed("boom"));
    }

    #[tokio::test]
    async fn test_dropping_bus_closes_subscriptions() {
        let bus: ResultBus<u64, &'static str> = ResultBus::new(4);
        let mut results = bus.subscribe_results();
        let mut dirty = bus.subscribe_dirty();

        drop(bus);

        assert!(matches!(
            results.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(dirty.changed().await.is_err());
    }
}
