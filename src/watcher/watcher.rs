//! Repository watcher using notify-rs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::handler::{ChangeHandler, WatcherStats, WatcherStatsSnapshot};
use crate::error::WatcherError;
use crate::Result;

/// Watches a repository's git directory (and optionally the document's
/// directory) and feeds every event to a [`ChangeHandler`].
pub struct RepositoryWatcher {
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched: Mutex<Vec<(PathBuf, RecursiveMode)>>,
    stats: Arc<WatcherStats>,
}

impl RepositoryWatcher {
    /// Create a watcher delivering events to `handler`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher cannot be created.
    pub fn new(handler: ChangeHandler) -> Result<Self> {
        let stats = handler.stats();
        let watcher = notify::recommended_watcher(move |res| handler.handle(res)).map_err(|e| {
            WatcherError::WatchFailed {
                path: "init".to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            watcher: Mutex::new(Some(watcher)),
            watched: Mutex::new(Vec::new()),
            stats,
        })
    }

    /// Add a path to watch.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist, cannot be watched, or
    /// the watcher has been disposed.
    pub fn watch(&self, path: impl AsRef<Path>, recursive: bool) -> Result<()> {
        let path = path.as_ref();
        let failed = |reason: String| WatcherError::WatchFailed {
            path: path.display().to_string(),
            reason,
        };

        if !path.exists() {
            return Err(failed("path does not exist".to_string()).into());
        }

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        let mut guard = self.watcher.lock();
        let watcher = guard
            .as_mut()
            .ok_or_else(|| failed("watcher has been disposed".to_string()))?;
        watcher
            .watch(path, mode)
            .map_err(|e| failed(e.to_string()))?;
        drop(guard);

        self.watched.lock().push((path.to_path_buf(), mode));
        tracing::info!(path = %path.display(), recursive, "Watching path");

        Ok(())
    }

    /// Stop watching a path.
    ///
    /// # Errors
    ///
    /// Returns an error if unwatching fails.
    pub fn unwatch(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(watcher) = self.watcher.lock().as_mut() {
            watcher
                .unwatch(path)
                .map_err(|e| WatcherError::WatchFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
        }

        self.watched.lock().retain(|(p, _)| p != path);

        tracing::info!(path = %path.display(), "Stopped watching path");
        Ok(())
    }

    /// Paths currently watched.
    #[must_use]
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> WatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Release the platform watcher. Idempotent.
    pub fn dispose(&self) {
        if self.watcher.lock().take().is_some() {
            self.watched.lock().clear();
            tracing::debug!("Repository watcher disposed");
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.watcher.lock().is_none()
    }
}

impl std::fmt::Debug for RepositoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryWatcher")
            .field("watched", &self.watched_paths())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
