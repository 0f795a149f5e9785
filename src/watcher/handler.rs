//! Routes watcher events to a parser and the document.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use notify::Event;
use tokio::sync::mpsc;

use super::events::FsChange;
use super::filter::{ChangeFilter, Route};
use crate::parser::{TriggerOrigin, TriggerSink};

/// Statistics for file watching.
#[derive(Debug, Default)]
pub struct WatcherStats {
    pub events_seen: AtomicU64,
    pub events_filtered: AtomicU64,
    pub triggers_sent: AtomicU64,
    pub reloads_requested: AtomicU64,
    pub errors: AtomicU64,
}

impl WatcherStats {
    /// Create new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            events_seen: self.events_seen.load(Ordering::Relaxed),
            events_filtered: self.events_filtered.load(Ordering::Relaxed),
            triggers_sent: self.triggers_sent.load(Ordering::Relaxed),
            reloads_requested: self.reloads_requested.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of watcher stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherStatsSnapshot {
    pub events_seen: u64,
    pub events_filtered: u64,
    pub triggers_sent: u64,
    pub reloads_requested: u64,
    pub errors: u64,
}

/// Turns raw watcher events into parser triggers and document reloads.
///
/// Called synchronously on the watcher backend's thread.
pub struct ChangeHandler {
    filter: ChangeFilter,
    sink: Arc<dyn TriggerSink>,
    reload_tx: Option<mpsc::Sender<()>>,
    stats: Arc<WatcherStats>,
}

impl ChangeHandler {
    /// Create a handler that triggers `sink` for repository changes.
    pub fn new(filter: ChangeFilter, sink: Arc<dyn TriggerSink>, stats: Arc<WatcherStats>) -> Self {
        Self {
            filter,
            sink,
            reload_tx: None,
            stats,
        }
    }

    /// Also request document reloads through `reload_tx`.
    ///
    /// A full channel means a reload is already queued, so requests coalesce.
    #[must_use]
    pub fn with_reloads(mut self, reload_tx: mpsc::Sender<()>) -> Self {
        self.reload_tx = Some(reload_tx);
        self
    }

    /// Shared statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<WatcherStats> {
        Arc::clone(&self.stats)
    }

    /// Handle one backend callback.
    pub fn handle(&self, result: notify::Result<Event>) {
        match result {
            Ok(event) => self.process(&FsChange::from(event)),
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "Watch error");
            }
        }
    }

    /// Handle one classified change.
    pub fn process(&self, change: &FsChange) {
        let mut repository = false;
        let mut document = false;

        for path in change.paths() {
            self.stats.events_seen.fetch_add(1, Ordering::Relaxed);
            match self.filter.route(change.kind, path) {
                Route::Repository => repository = true,
                Route::Document => document = true,
                Route::Ignored => {
                    self.stats.events_filtered.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(path = %path.display(), kind = ?change.kind, "Change filtered");
                }
            }
        }

        if document {
            self.request_reload();
        }

        if repository {
            match self.sink.trigger(TriggerOrigin::FilesystemChanged) {
                Ok(()) => {
                    self.stats.triggers_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping repository change");
                }
            }
        }
    }

    fn request_reload(&self) {
        let Some(tx) = &self.reload_tx else {
            return;
        };
        match tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {
                self.stats.reloads_requested.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                tracing::debug!("Document reload channel closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::events::FsChangeKind;
    use crate::{Error, Result};
    use notify::event::{AccessKind, CreateKind};
    use notify::EventKind;
    use parking_lot::Mutex;
    use std::path::PathBuf;

    #[derive(Default)]
    struct RecordingSink {
        origins: Mutex<Vec<TriggerOrigin>>,
        disposed: bool,
    }

    impl TriggerSink for RecordingSink {
        fn trigger(&self, origin: TriggerOrigin) -> Result<()> {
            if self.disposed {
                return Err(Error::Disposed);
            }
            self.origins.lock().push(origin);
            Ok(())
        }
    }

    fn handler(sink: Arc<RecordingSink>) -> ChangeHandler {
        let filter = ChangeFilter::new("/repo/.git", Some(PathBuf::from("/repo/file.txt")));
        ChangeHandler::new(filter, sink, WatcherStats::new())
    }

    #[test]
    fn test_repository_change_triggers_once_per_event() {
        let sink = Arc::new(RecordingSink::default());
        let handler = handler(Arc::clone(&sink));

        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/repo/.git/index"))
            .add_path(PathBuf::from("/repo/.git/ORIG_HEAD"));
        handler.handle(Ok(event));

        assert_eq!(*sink.origins.lock(), vec![TriggerOrigin::FilesystemChanged]);
        let stats = handler.stats().snapshot();
        assert_eq!(stats.events_seen, 2);
        assert_eq!(stats.triggers_sent, 1);
        assert_eq!(stats.events_filtered, 0);
    }

    #[test]
    fn test_filtered_changes_never_reach_sink() {
        let sink = Arc::new(RecordingSink::default());
        let handler = handler(Arc::clone(&sink));

        handler.process(&FsChange::new(
            FsChangeKind::Created,
            "/repo/.git/index.lock",
        ));
        handler.handle(Ok(Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/repo/.git/index"))));
        handler.process(&FsChange::new(FsChangeKind::Changed, "/elsewhere/file"));

        assert!(sink.origins.lock().is_empty());
        let stats = handler.stats().snapshot();
        assert_eq!(stats.events_filtered, 3);
        assert_eq!(stats.triggers_sent, 0);
    }

    #[test]
    fn test_document_change_requests_reload() {
        let sink = Arc::new(RecordingSink::default());
        let (tx, mut rx) = mpsc::channel(1);
        let handler = handler(Arc::clone(&sink)).with_reloads(tx);

        handler.process(&FsChange::new(FsChangeKind::Changed, "/repo/file.txt"));
        handler.process(&FsChange::new(FsChangeKind::Changed, "/repo/file.txt"));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert!(sink.origins.lock().is_empty());
        assert_eq!(handler.stats().snapshot().reloads_requested, 2);
    }

    #[test]
    fn test_watch_errors_are_counted() {
        let sink = Arc::new(RecordingSink::default());
        let handler = handler(sink);

        handler.handle(Err(notify::Error::generic("backend failure")));

        assert_eq!(handler.stats().snapshot().errors, 1);
    }

    #[test]
    fn test_disposed_sink_is_tolerated() {
        let sink = Arc::new(RecordingSink {
            disposed: true,
            ..Default::default()
        });
        let handler = handler(Arc::clone(&sink));

        handler.process(&FsChange::new(FsChangeKind::Changed, "/repo/.git/HEAD"));

        assert_eq!(handler.stats().snapshot().triggers_sent, 0);
    }
}
