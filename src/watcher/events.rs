//! File system change types.

use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Event, EventKind};

/// Simplified change kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsChangeKind {
    /// A file or directory was created.
    Created,
    /// Contents or metadata changed.
    Changed,
    /// A file or directory was removed.
    Removed,
    /// A file or directory was renamed.
    Renamed,
    /// Read or open without modification.
    Access,
    /// Backend could not classify the event.
    Other,
}

impl From<EventKind> for FsChangeKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Create(_) => Self::Created,
            EventKind::Modify(ModifyKind::Name(_)) => Self::Renamed,
            EventKind::Modify(_) => Self::Changed,
            EventKind::Remove(_) => Self::Removed,
            EventKind::Access(_) => Self::Access,
            EventKind::Any | EventKind::Other => Self::Other,
        }
    }
}

/// A change reported by the watcher backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsChange {
    /// What happened.
    pub kind: FsChangeKind,
    /// Affected paths. Renames may carry both the old and the new path.
    pub paths: Vec<PathBuf>,
}

impl FsChange {
    /// Create a change for a single path.
    pub fn new(kind: FsChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            paths: vec![path.into()],
        }
    }

    /// Iterate over the affected paths.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

impl From<Event> for FsChange {
    fn from(event: Event) -> Self {
        Self {
            kind: event.kind.into(),
            paths: event.paths,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind, RenameMode};

    #[test]
    fn test_kind_from_event_kind() {
        assert_eq!(
            FsChangeKind::from(EventKind::Create(CreateKind::File)),
            FsChangeKind::Created
        );
        assert_eq!(
            FsChangeKind::from(EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            FsChangeKind::Changed
        );
        assert_eq!(
            FsChangeKind::from(EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            FsChangeKind::Renamed
        );
        assert_eq!(
            FsChangeKind::from(EventKind::Remove(RemoveKind::File)),
            FsChangeKind::Removed
        );
        assert_eq!(
            FsChangeKind::from(EventKind::Access(AccessKind::Any)),
            FsChangeKind::Access
        );
        assert_eq!(FsChangeKind::from(EventKind::Any), FsChangeKind::Other);
    }

    #[test]
    fn test_change_from_event_keeps_paths() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/repo/.git/index.lock"))
            .add_path(PathBuf::from("/repo/.git/index"));

        let change = FsChange::from(event);

        assert_eq!(change.kind, FsChangeKind::Renamed);
        assert_eq!(change.paths().count(), 2);
        assert_eq!(change.paths[1], PathBuf::from("/repo/.git/index"));
    }
}
