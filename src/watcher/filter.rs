//! Cheap synchronous filtering of repository changes.
//!
//! Runs on the watcher backend's thread, before anything reaches a parser, so
//! a filtered change never sets the dirty flag or restarts a debounce timer.

use std::path::{Path, PathBuf};

use super::events::FsChangeKind;

/// Where a change should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Repository state changed; schedule a reparse.
    Repository,
    /// The tracked document changed on disk; reload it.
    Document,
    /// Not relevant.
    Ignored,
}

/// Decides which changes are relevant to a tracked document.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    git_dir: PathBuf,
    document: Option<PathBuf>,
}

impl ChangeFilter {
    /// Create a filter for changes under `git_dir`, plus changes to
    /// `document` itself when given.
    pub fn new(git_dir: impl Into<PathBuf>, document: Option<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
            document,
        }
    }

    /// The repository's git directory.
    #[must_use]
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Route a single path of a change.
    #[must_use]
    pub fn route(&self, kind: FsChangeKind, path: &Path) -> Route {
        if kind == FsChangeKind::Access {
            return Route::Ignored;
        }

        if self.document.as_deref() == Some(path) {
            return Route::Document;
        }

        if !path.starts_with(&self.git_dir) {
            return Route::Ignored;
        }

        if Self::is_lock_file(path) {
            return Route::Ignored;
        }

        // Directory timestamps change whenever an entry does; the entry's own
        // event is the one that matters.
        if kind == FsChangeKind::Changed && path.is_dir() {
            return Route::Ignored;
        }

        Route::Repository
    }

    /// Check if a path is a git lock file (`*.lock`, any case).
    #[must_use]
    pub fn is_lock_file(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("lock"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn filter() -> ChangeFilter {
        ChangeFilter::new("/repo/.git", Some(PathBuf::from("/repo/src/main.rs")))
    }

    #[test]
    fn test_is_lock_file() {
        assert!(ChangeFilter::is_lock_file(Path::new("/repo/.git/index.lock")));
        assert!(ChangeFilter::is_lock_file(Path::new("/repo/.git/HEAD.LOCK")));
        assert!(ChangeFilter::is_lock_file(Path::new("refs/heads/main.Lock")));
        assert!(!ChangeFilter::is_lock_file(Path::new("/repo/.git/index")));
        assert!(!ChangeFilter::is_lock_file(Path::new("/repo/.git/lock")));
    }

    #[test]
    fn test_repository_changes_are_routed() {
        let filter = filter();
        for kind in [
            FsChangeKind::Created,
            FsChangeKind::Changed,
            FsChangeKind::Removed,
            FsChangeKind::Renamed,
            FsChangeKind::Other,
        ] {
            assert_eq!(
                filter.route(kind, Path::new("/repo/.git/index")),
                Route::Repository,
                "{kind:?}"
            );
        }
    }

    #[test]
    fn test_lock_files_are_ignored() {
        let filter = filter();
        assert_eq!(
            filter.route(FsChangeKind::Created, Path::new("/repo/.git/index.lock")),
            Route::Ignored
        );
        assert_eq!(
            filter.route(
                FsChangeKind::Renamed,
                Path::new("/repo/.git/refs/heads/main.lock")
            ),
            Route::Ignored
        );
    }

    #[test]
    fn test_access_is_ignored() {
        let filter = filter();
        assert_eq!(
            filter.route(FsChangeKind::Access, Path::new("/repo/.git/index")),
            Route::Ignored
        );
        assert_eq!(
            filter.route(FsChangeKind::Access, Path::new("/repo/src/main.rs")),
            Route::Ignored
        );
    }

    #[test]
    fn test_document_changes_are_routed() {
        let filter = filter();
        assert_eq!(
            filter.route(FsChangeKind::Changed, Path::new("/repo/src/main.rs")),
            Route::Document
        );
        assert_eq!(
            filter.route(FsChangeKind::Changed, Path::new("/repo/src/lib.rs")),
            Route::Ignored
        );
    }

    #[test]
    fn test_document_ignored_without_follow() {
        let filter = ChangeFilter::new("/repo/.git", None);
        assert_eq!(
            filter.route(FsChangeKind::Changed, Path::new("/repo/src/main.rs")),
            Route::Ignored
        );
    }

    #[test]
    fn test_changed_directory_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path().join(".git");
        let refs = git_dir.join("refs");
        fs::create_dir_all(&refs).unwrap();
        let filter = ChangeFilter::new(&git_dir, None);

        assert_eq!(filter.route(FsChangeKind::Changed, &refs), Route::Ignored);
        assert_eq!(filter.route(FsChangeKind::Created, &refs), Route::Repository);
        assert_eq!(
            filter.route(FsChangeKind::Changed, &git_dir.join("HEAD")),
            Route::Repository
        );
    }
}
