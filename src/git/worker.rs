//! Background worker computing a document's diff against git.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::commands::{FileStatus, GitCommands};
use super::hunk::{compute_hunks, DiffResult};
use crate::document::{DocumentSnapshot, TextBuffer};
use crate::error::{GitError, WorkerError};
use crate::parser::Worker;

/// Display name of the git diff parser.
pub const PARSER_NAME: &str = "Git Diff Analyzer";

/// Debounce delay used when the parser is driven by filesystem changes.
pub const DEFAULT_GIT_REPARSE_DELAY: Duration = Duration::from_millis(500);

/// Diffs a [`TextBuffer`] against `HEAD` and the index.
#[derive(Debug)]
pub struct GitDiffWorker {
    buffer: Arc<TextBuffer>,
    commands: GitCommands,
}

impl GitDiffWorker {
    /// Create a worker for `buffer`.
    pub fn new(buffer: Arc<TextBuffer>, commands: GitCommands) -> Self {
        Self { buffer, commands }
    }

    /// The tracked buffer.
    #[must_use]
    pub fn buffer(&self) -> &Arc<TextBuffer> {
        &self.buffer
    }
}

impl Worker for GitDiffWorker {
    type Snapshot = DocumentSnapshot;
    type Output = DiffResult;

    fn snapshot(&self) -> DocumentSnapshot {
        self.buffer.snapshot()
    }

    fn parse(
        &self,
        snapshot: Arc<DocumentSnapshot>,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<DiffResult, WorkerError>> + Send {
        let commands = self.commands.clone();
        async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(WorkerError::Cancelled),
                result = diff_document(&commands, &snapshot) => result.map_err(WorkerError::from),
            }
        }
    }
}

/// Compute the diff of `snapshot` against its repository.
///
/// Anything that makes a diff meaningless (no repository, a file inside the
/// git directory, an ignored file, no `HEAD` version) yields an empty result
/// rather than an error.
///
/// # Errors
///
/// Returns an error if git cannot be run or a status query fails.
pub async fn diff_document(
    commands: &GitCommands,
    snapshot: &DocumentSnapshot,
) -> Result<DiffResult, GitError> {
    let Some(repo) = commands.discover(&snapshot.path).await? else {
        return Ok(DiffResult::default());
    };
    if repo.contains_git_path(&snapshot.path) {
        return Ok(DiffResult::default());
    }
    let Some(relative) = repo.relative_path(&snapshot.path) else {
        return Ok(DiffResult::default());
    };

    let status = commands.status(&repo, &relative).await?;
    tracing::trace!(path = %relative, ?status, "Classified document");
    match status {
        FileStatus::Ignored => return Ok(DiffResult::default()),
        FileStatus::Unaltered if !snapshot.modified => return Ok(DiffResult::default()),
        _ => {}
    }

    let head_text = if status.is_new() {
        String::new()
    } else {
        match commands.read_blob(&repo, &format!("HEAD:{relative}")).await? {
            Some(text) => text,
            None => return Ok(DiffResult::default()),
        }
    };

    let (index_text, index_suppress) = if status == FileStatus::Untracked {
        (None, true)
    } else {
        (commands.read_blob(&repo, &format!(":{relative}")).await?, false)
    };
    let index_text = index_text.as_deref().unwrap_or(&head_text);

    Ok(DiffResult {
        to_index: compute_hunks(index_text, &snapshot.text, index_suppress),
        to_head: compute_hunks(&head_text, &snapshot.text, status.is_new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_document_outside_repository_is_empty() {
        let commands = GitCommands::default();
        let buffer = TextBuffer::new("/nonexistent/dir/file.txt", "text\n");

        let result = diff_document(&commands, &buffer.snapshot()).await.unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_token_wins() {
        let tmp = TempDir::new().unwrap();
        let buffer = Arc::new(TextBuffer::new(tmp.path().join("file.txt"), "a\n"));
        let worker = GitDiffWorker::new(Arc::clone(&buffer), GitCommands::default());
        let token = CancellationToken::new();
        token.cancel();

        let result = worker.parse(Arc::new(worker.snapshot()), token).await;

        assert_eq!(result, Err(WorkerError::Cancelled));
    }

    #[tokio::test]
    async fn test_git_failure_becomes_worker_failure() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file.txt");
        std::fs::write(&file, "a\n").unwrap();
        let buffer = Arc::new(TextBuffer::new(file, "a\n"));
        let worker = GitDiffWorker::new(buffer, GitCommands::new("/nonexistent/git-binary"));

        let result = worker
            .parse(Arc::new(worker.snapshot()), CancellationToken::new())
            .await;

        assert!(matches!(result, Err(WorkerError::Failed(msg)) if msg.contains("failed to run git")));
    }

    #[test]
    fn test_snapshot_comes_from_buffer() {
        let buffer = Arc::new(TextBuffer::new("/repo/file.txt", "a\n"));
        let worker = GitDiffWorker::new(Arc::clone(&buffer), GitCommands::default());
        buffer.replace("b\n");

        let snapshot = worker.snapshot();

        assert_eq!(snapshot.version, 2);
        assert!(snapshot.modified);
        assert_eq!(worker.buffer().version(), 2);
    }
}
