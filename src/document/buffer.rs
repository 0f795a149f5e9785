//! Versioned in-memory text buffer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::parser::Snapshot;
use crate::Result;

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Immutable view of a [`TextBuffer`] at one version.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    /// Absolute path of the document on disk.
    pub path: Arc<Path>,
    /// Buffer version; increases by one on every content change.
    pub version: u64,
    /// Full buffer text.
    pub text: Arc<str>,
    /// Whether the buffer differs from what was last loaded from disk.
    pub modified: bool,
}

impl Snapshot for DocumentSnapshot {
    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug)]
struct BufferState {
    version: u64,
    text: Arc<str>,
    modified: bool,
}

/// Text of one document plus change notifications.
///
/// Every content change bumps the version and notifies subscribers with the
/// new version number.
#[derive(Debug)]
pub struct TextBuffer {
    path: Arc<Path>,
    state: RwLock<BufferState>,
    changes: broadcast::Sender<u64>,
}

impl TextBuffer {
    /// Create a buffer holding `text` for the document at `path`.
    ///
    /// The buffer starts unmodified at version 1.
    pub fn new(path: impl Into<PathBuf>, text: impl Into<Arc<str>>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path: Arc::from(path.into()),
            state: RwLock::new(BufferState {
                version: 1,
                text: text.into(),
                modified: false,
            }),
            changes,
        }
    }

    /// Load the document at `path` from disk.
    ///
    /// The path is canonicalized so it compares equal to paths reported by
    /// git and the filesystem watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be resolved or read.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = tokio::fs::canonicalize(path.as_ref()).await?;
        let bytes = tokio::fs::read(&path).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Opened document");
        Ok(Self::new(path, text))
    }

    /// Path of the document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// Whether the buffer has unsaved edits.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.state.read().modified
    }

    /// Current text.
    #[must_use]
    pub fn text(&self) -> Arc<str> {
        Arc::clone(&self.state.read().text)
    }

    /// Capture the current state.
    #[must_use]
    pub fn snapshot(&self) -> DocumentSnapshot {
        let state = self.state.read();
        DocumentSnapshot {
            path: Arc::clone(&self.path),
            version: state.version,
            text: Arc::clone(&state.text),
            modified: state.modified,
        }
    }

    /// Replace the buffer text as an edit.
    ///
    /// Returns the new version.
    pub fn replace(&self, text: impl Into<Arc<str>>) -> u64 {
        self.apply(text.into(), true)
    }

    /// Re-read the document from disk, discarding edits.
    ///
    /// Returns the new version, or `None` if the buffer already matched the
    /// file and had no edits.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn reload(&self) -> Result<Option<u64>> {
        let bytes = tokio::fs::read(&*self.path).await?;
        let text = String::from_utf8_lossy(&bytes);

        {
            let state = self.state.read();
            if !state.modified && *state.text == *text {
                return Ok(None);
            }
        }

        let version = self.apply(Arc::from(text.as_ref()), false);
        tracing::debug!(path = %self.path.display(), version, "Reloaded document from disk");
        Ok(Some(version))
    }

    /// Subscribe to content changes. Each message is the new version.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.changes.subscribe()
    }

    fn apply(&self, text: Arc<str>, modified: bool) -> u64 {
        let version = {
            let mut state = self.state.write();
            state.version += 1;
            state.text = text;
            state.modified = modified;
            state.version
        };
        let _ = self.changes.send(version);
        version
    }
}
