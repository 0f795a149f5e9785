//! Keeps one document's git diff up to date.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use super::commands::{GitCommands, Repository};
use super::hunk::DiffResult;
use super::worker::GitDiffWorker;
use crate::config::Config;
use crate::document::{DocumentSnapshot, TextBuffer};
use crate::parser::{BackgroundParser, ParseFailure, ParseResult, TriggerOrigin, TriggerSink};
use crate::watcher::{ChangeFilter, ChangeHandler, RepositoryWatcher, WatcherStats, WatcherStatsSnapshot};
use crate::Result;

/// Published diff of one document version.
pub type DiffUpdate = ParseResult<DocumentSnapshot, DiffResult>;

/// Owns everything needed to track one document: the background parser, the
/// repository watcher and the tasks forwarding buffer changes.
pub struct DiffTracker {
    buffer: Arc<TextBuffer>,
    parser: BackgroundParser<GitDiffWorker>,
    repository: Option<Repository>,
    watcher: Option<RepositoryWatcher>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl DiffTracker {
    /// Start tracking `buffer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, git fails while
    /// locating the repository, or the repository cannot be watched.
    pub async fn start(buffer: Arc<TextBuffer>, config: &Config) -> Result<Self> {
        let parser_config = config.parser_config()?;
        let commands = GitCommands::new(&config.git);
        let repository = commands.discover(buffer.path()).await?;
        if repository.is_none() {
            tracing::info!(path = %buffer.path().display(), "Document is not in a git repository");
        }

        let worker = GitDiffWorker::new(Arc::clone(&buffer), commands);
        let parser = BackgroundParser::new(worker, parser_config)?;

        let mut tasks = Vec::new();
        let watcher = match (&repository, config.watch) {
            (Some(repo), true) => {
                let (reload_tx, reload_rx) = mpsc::channel(1);
                match watch_repository(repo, &buffer, &parser, config.follow_disk, reload_tx) {
                    Ok(watcher) => {
                        if config.follow_disk {
                            tasks.push(tokio::spawn(reload_on_request(
                                Arc::clone(&buffer),
                                reload_rx,
                            )));
                        }
                        Some(watcher)
                    }
                    Err(e) => {
                        parser.dispose();
                        return Err(e);
                    }
                }
            }
            _ => None,
        };

        tasks.push(tokio::spawn(forward_content_changes(
            buffer.subscribe(),
            parser.clone(),
        )));

        tracing::info!(
            path = %buffer.path().display(),
            parser = parser.name(),
            watching = watcher.is_some(),
            "Tracking document"
        );

        Ok(Self {
            buffer,
            parser,
            repository,
            watcher,
            tasks: Mutex::new(tasks),
            disposed: AtomicBool::new(false),
        })
    }

    /// The tracked buffer.
    #[must_use]
    pub fn buffer(&self) -> &Arc<TextBuffer> {
        &self.buffer
    }

    /// The background parser.
    #[must_use]
    pub fn parser(&self) -> &BackgroundParser<GitDiffWorker> {
        &self.parser
    }

    /// The repository containing the document, if any.
    #[must_use]
    pub fn repository(&self) -> Option<&Repository> {
        self.repository.as_ref()
    }

    /// Watcher statistics, if the repository is being watched.
    #[must_use]
    pub fn watcher_stats(&self) -> Option<WatcherStatsSnapshot> {
        self.watcher.as_ref().map(RepositoryWatcher::stats)
    }

    /// Subscribe to published diffs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disposed`](crate::Error::Disposed) after disposal.
    pub fn subscribe_results(&self) -> Result<broadcast::Receiver<Arc<DiffUpdate>>> {
        self.parser.subscribe_results()
    }

    /// Subscribe to failed diffs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disposed`](crate::Error::Disposed) after disposal.
    pub fn subscribe_failures(&self) -> Result<broadcast::Receiver<ParseFailure>> {
        self.parser.subscribe_failures()
    }

    /// Subscribe to the dirty flag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disposed`](crate::Error::Disposed) after disposal.
    pub fn subscribe_dirty(&self) -> Result<watch::Receiver<bool>> {
        self.parser.subscribe_dirty()
    }

    /// Stop the parser, the watcher and all forwarding tasks. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(watcher) = &self.watcher {
            watcher.dispose();
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.parser.dispose();

        tracing::info!(path = %self.buffer.path().display(), "Stopped tracking document");
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for DiffTracker {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for DiffTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffTracker")
            .field("path", &self.buffer.path())
            .field("parser", &self.parser)
            .field("watcher", &self.watcher)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

fn watch_repository(
    repo: &Repository,
    buffer: &TextBuffer,
    parser: &BackgroundParser<GitDiffWorker>,
    follow_disk: bool,
    reload_tx: mpsc::Sender<()>,
) -> Result<RepositoryWatcher> {
    let document = follow_disk.then(|| buffer.path().to_path_buf());
    let filter = ChangeFilter::new(&repo.git_dir, document);
    let sink: Arc<dyn TriggerSink> = Arc::new(parser.clone());
    let mut handler = ChangeHandler::new(filter, sink, WatcherStats::new());
    if follow_disk {
        handler = handler.with_reloads(reload_tx);
    }

    let watcher = RepositoryWatcher::new(handler)?;
    watcher.watch(&repo.git_dir, true)?;
    if follow_disk {
        if let Some(parent) = buffer.path().parent() {
            watcher.watch(parent, false)?;
        }
    }
    Ok(watcher)
}

/// Turn buffer versions into content-change triggers.
async fn forward_content_changes(
    mut changes: broadcast::Receiver<u64>,
    parser: BackgroundParser<GitDiffWorker>,
) {
    loop {
        match changes.recv().await {
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                if parser.trigger(TriggerOrigin::ContentChanged).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn reload_on_request(buffer: Arc<TextBuffer>, mut requests: mpsc::Receiver<()>) {
    while requests.recv().await.is_some() {
        if let Err(e) = buffer.reload().await {
            tracing::warn!(path = %buffer.path().display(), error = %e, "Failed to reload document");
        }
    }
}
