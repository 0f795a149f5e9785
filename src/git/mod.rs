//! Git-backed diff tracking.
//!
//! The [`GitDiffWorker`] computes line hunks of a buffer against `HEAD` and
//! the index; the [`DiffTracker`] drives it from buffer edits and repository
//! changes through a [`BackgroundParser`](crate::parser::BackgroundParser).

mod commands;
mod hunk;
mod tracker;
mod worker;

pub use commands::{FileStatus, GitCommands, Repository};
pub use hunk::{compute_hunks, DiffHunk, DiffResult, HunkKind};
pub use tracker::{DiffTracker, DiffUpdate};
pub use worker::{diff_document, GitDiffWorker, DEFAULT_GIT_REPARSE_DELAY, PARSER_NAME};
