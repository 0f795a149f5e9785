//! File system watching.
//!
//! This module provides:
//! - Repository watching using notify-rs
//! - Lock-file, directory and access-event filtering
//! - Routing of surviving changes to a parser or a document reload

mod events;
mod filter;
mod handler;
#[allow(clippy::module_inception)]
mod watcher;

pub use events::{FsChange, FsChangeKind};
pub use filter::{ChangeFilter, Route};
pub use handler::{ChangeHandler, WatcherStats, WatcherStatsSnapshot};
pub use watcher::RepositoryWatcher;
