//! Error types and Result aliases for diffwatch.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using diffwatch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for diffwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation attempted after the parser was disposed.
    #[error("parser has been disposed")]
    Disposed,

    /// Background worker error.
    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Git command error.
    #[error("git error: {0}")]
    Git(#[from] GitError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Outcome of a worker invocation that did not produce a result.
///
/// Cloneable so a single failure can be fanned out to every subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The worker reported a failure.
    #[error("worker failed: {0}")]
    Failed(String),

    /// The worker observed its cancellation token and stopped.
    #[error("worker cancelled")]
    Cancelled,

    /// The worker task panicked.
    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },
}

/// Git invocation errors.
#[derive(Error, Debug)]
pub enum GitError {
    /// The git executable could not be started.
    #[error("failed to run git: {reason}")]
    Spawn { reason: String },

    /// Git exited unsuccessfully.
    #[error("`git {command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Git produced output we could not interpret.
    #[error("unexpected git output: {0}")]
    InvalidOutput(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl WorkerError {
    /// Create a worker failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Whether this outcome is a cooperative cancellation rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<GitError> for WorkerError {
    fn from(err: GitError) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

#[cfg(test)]
mod tests;
