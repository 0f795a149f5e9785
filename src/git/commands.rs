//! Thin async wrapper around the `git` command line.
//!
//! Child processes are spawned with `kill_on_drop`, so dropping a pending
//! call (for example when a parse is cancelled) also stops the process.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::Instrument;

use crate::error::GitError;
use crate::observability::spans;

type GitResult<T> = std::result::Result<T, GitError>;

/// A discovered repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Absolute path of the git directory (usually `<work_tree>/.git`).
    pub git_dir: PathBuf,
    /// Absolute path of the working tree root.
    pub work_tree: PathBuf,
}

impl Repository {
    /// Path of `file` relative to the working tree, with `/` separators as
    /// git expects in revision specs.
    ///
    /// Returns `None` if `file` is outside the working tree.
    #[must_use]
    pub fn relative_path(&self, file: &Path) -> Option<String> {
        let relative = file.strip_prefix(&self.work_tree).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    /// Whether `path` lies inside the git directory itself.
    #[must_use]
    pub fn contains_git_path(&self, path: &Path) -> bool {
        path.starts_with(&self.git_dir)
    }
}

/// Working tree status of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Identical to the index and `HEAD`.
    Unaltered,
    /// Tracked and changed in the index or working tree.
    Modified,
    /// Staged as a new file.
    Added,
    /// Not tracked.
    Untracked,
    /// Matched by an ignore rule.
    Ignored,
}

impl FileStatus {
    /// Parse the first entry of `git status --porcelain=v1 -z` output.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is shorter than its status code.
    pub fn from_porcelain(output: &[u8]) -> GitResult<Self> {
        let entry = output.split(|b| *b == 0).next().unwrap_or_default();
        if entry.is_empty() {
            return Ok(Self::Unaltered);
        }
        let code = entry.get(..2).ok_or_else(|| {
            GitError::InvalidOutput(format!(
                "short status entry '{}'",
                String::from_utf8_lossy(entry)
            ))
        })?;

        Ok(match code {
            b"??" => Self::Untracked,
            b"!!" => Self::Ignored,
            [b'A', _] => Self::Added,
            _ => Self::Modified,
        })
    }

    /// Whether `HEAD` has no version of the file.
    #[must_use]
    pub const fn is_new(self) -> bool {
        matches!(self, Self::Untracked | Self::Added)
    }
}

/// Runs git subcommands.
#[derive(Debug, Clone)]
pub struct GitCommands {
    program: PathBuf,
}

impl Default for GitCommands {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCommands {
    /// Use `program` as the git executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The git executable.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Whether the git executable can be run at all.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .is_ok_and(|status| status.success())
    }

    /// Find the repository containing `path`.
    ///
    /// Returns `None` when `path` is not inside a working tree (including
    /// paths inside a git directory).
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be started or prints something
    /// unexpected.
    pub async fn discover(&self, path: &Path) -> GitResult<Option<Repository>> {
        let dir = if path.is_dir() {
            path
        } else {
            match path.parent() {
                Some(parent) if parent.is_dir() => parent,
                _ => return Ok(None),
            }
        };

        let output = self
            .output(dir, &["rev-parse", "--absolute-git-dir", "--show-toplevel"])
            .await?;
        if !output.status.success() {
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();
        let (Some(git_dir), Some(work_tree)) = (lines.next(), lines.next()) else {
            return Err(GitError::InvalidOutput(format!(
                "rev-parse printed '{}'",
                stdout.trim()
            )));
        };

        Ok(Some(Repository {
            git_dir: canonical(git_dir).await,
            work_tree: canonical(work_tree).await,
        }))
    }

    /// Status of `relative` within `repo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn status(&self, repo: &Repository, relative: &str) -> GitResult<FileStatus> {
        let args = [
            "status",
            "--porcelain=v1",
            "--ignored",
            "-z",
            "--",
            relative,
        ];
        let output = self.checked(&repo.work_tree, &args).await?;
        FileStatus::from_porcelain(&output.stdout)
    }

    /// Contents of the blob named by `object` (e.g. `HEAD:src/main.rs` or
    /// `:src/main.rs` for the index), in working-tree form: end-of-line
    /// conversion and smudge filters are applied as on checkout.
    ///
    /// Returns `None` if no such object exists.
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be started.
    pub async fn read_blob(&self, repo: &Repository, object: &str) -> GitResult<Option<String>> {
        let output = self
            .output(&repo.work_tree, &["cat-file", "--filters", object])
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    async fn checked(&self, cwd: &Path, args: &[&str]) -> GitResult<Output> {
        let output = self.output(cwd, args).await?;
        if output.status.success() {
            return Ok(output);
        }

        Err(GitError::CommandFailed {
            command: args.join(" "),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn output(&self, cwd: &Path, args: &[&str]) -> GitResult<Output> {
        let name = args.first().copied().unwrap_or_default();

        Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            // Queries must not refresh the index: that write would show up in
            // the watched git directory as a new change.
            .env("GIT_OPTIONAL_LOCKS", "0")
            .env("GIT_LITERAL_PATHSPECS", "1")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .instrument(spans::git_span(name))
            .await
            .map_err(|e| GitError::Spawn {
                reason: format!("{}: {e}", self.program.display()),
            })
    }
}

async fn canonical(path: &str) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_porcelain() {
        assert_eq!(FileStatus::from_porcelain(b"").unwrap(), FileStatus::Unaltered);
        assert_eq!(
            FileStatus::from_porcelain(b"?? new.txt\0").unwrap(),
            FileStatus::Untracked
        );
        assert_eq!(
            FileStatus::from_porcelain(b"!! build.log\0").unwrap(),
            FileStatus::Ignored
        );
        assert_eq!(
            FileStatus::from_porcelain(b"A  added.txt\0").unwrap(),
            FileStatus::Added
        );
        assert_eq!(
            FileStatus::from_porcelain(b"AM added.txt\0").unwrap(),
            FileStatus::Added
        );
        assert_eq!(
            FileStatus::from_porcelain(b" M file.txt\0").unwrap(),
            FileStatus::Modified
        );
        assert_eq!(
            FileStatus::from_porcelain(b"R  new.txt\0old.txt\0").unwrap(),
            FileStatus::Modified
        );
    }

    #[test]
    fn test_status_rejects_truncated_entry() {
        let err = FileStatus::from_porcelain(b"?").unwrap_err();
        assert!(matches!(err, GitError::InvalidOutput(_)));
    }

    #[test]
    fn test_is_new() {
        assert!(FileStatus::Untracked.is_new());
        assert!(FileStatus::Added.is_new());
        assert!(!FileStatus::Modified.is_new());
        assert!(!FileStatus::Unaltered.is_new());
    }

    #[test]
    fn test_relative_path() {
        let repo = Repository {
            git_dir: PathBuf::from("/work/repo/.git"),
            work_tree: PathBuf::from("/work/repo"),
        };

        assert_eq!(
            repo.relative_path(Path::new("/work/repo/src/main.rs")),
            Some("src/main.rs".to_string())
        );
        assert_eq!(repo.relative_path(Path::new("/work/other/file")), None);
        assert_eq!(repo.relative_path(Path::new("/work/repo")), None);
        assert!(repo.contains_git_path(Path::new("/work/repo/.git/config")));
        assert!(!repo.contains_git_path(Path::new("/work/repo/src/main.rs")));
    }

    #[tokio::test]
    async fn test_discover_outside_repository() {
        let tmp = tempfile::TempDir::new().unwrap();
        let commands = GitCommands::default();
        if !commands.is_available().await {
            return;
        }

        let file = tmp.path().join("file.txt");
        std::fs::write(&file, "x\n").unwrap();
        // A temp dir can still sit inside a repository; only assert when it
        // clearly does not.
        if let Some(repo) = commands.discover(&file).await.unwrap() {
            assert!(file.canonicalize().unwrap().starts_with(&repo.work_tree));
        }
    }

    #[tokio::test]
    async fn test_discover_missing_directory() {
        let commands = GitCommands::default();
        let repo = commands
            .discover(Path::new("/nonexistent/dir/file.txt"))
            .await
            .unwrap();
        assert!(repo.is_none());
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let commands = GitCommands::new("/nonexistent/git-binary");
        let file = tmp.path().join("file.txt");
        std::fs::write(&file, "x\n").unwrap();

        let err = commands.discover(&file).await.unwrap_err();
        assert!(matches!(err, GitError::Spawn { .. }));
        assert!(!commands.is_available().await);
    }
}
