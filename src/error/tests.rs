//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("reparse delay cannot be negative");
        assert_eq!(
            err.to_string(),
            "configuration error: reparse delay cannot be negative"
        );
    }

    #[test]
    fn test_disposed_display() {
        assert_eq!(Error::Disposed.to_string(), "parser has been disposed");
    }

    #[test]
    fn test_worker_error_conversion() {
        let err: Error = WorkerError::failed("diff failed").into();
        assert!(matches!(err, Error::Worker(WorkerError::Failed(_))));
        assert_eq!(err.to_string(), "worker error: worker failed: diff failed");
    }

    #[test]
    fn test_worker_error_is_cancelled() {
        assert!(WorkerError::Cancelled.is_cancelled());
        assert!(!WorkerError::failed("boom").is_cancelled());
        assert!(!WorkerError::Panicked("boom".to_string()).is_cancelled());
    }

    #[test]
    fn test_git_error_into_worker_error() {
        let git_err = GitError::CommandFailed {
            command: "show HEAD:src/lib.rs".to_string(),
            status: "exit status: 128".to_string(),
            stderr: "fatal: invalid object name".to_string(),
        };
        let worker_err: WorkerError = git_err.into();
        match worker_err {
            WorkerError::Failed(msg) => {
                assert!(msg.contains("show HEAD:src/lib.rs"));
                assert!(msg.contains("invalid object name"));
            }
            other => panic!("unexpected worker error: {other:?}"),
        }
    }

    #[test]
    fn test_watcher_error_conversion() {
        let watch_err = WatcherError::WatchFailed {
            path: "/tmp/repo/.git".to_string(),
            reason: "permission denied".to_string(),
        };
        let err: Error = watch_err.into();
        assert!(matches!(err, Error::Watcher(_)));
        assert_eq!(
            err.to_string(),
            "watcher error: failed to watch path '/tmp/repo/.git': permission denied"
        );
    }

    #[test]
    fn test_git_error_spawn_display() {
        let err = GitError::Spawn {
            reason: "No such file or directory".to_string(),
        };
        assert_eq!(err.to_string(), "failed to run git: No such file or directory");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_io_error_into_worker_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: WorkerError = io_err.into();
        assert_eq!(err, WorkerError::Failed("denied".to_string()));
    }

    #[test]
    fn test_error_internal() {
        let err = Error::internal("no tokio runtime");
        assert_eq!(err.to_string(), "internal error: no tokio runtime");
    }

    #[test]
    fn test_error_debug_format() {
        let err = Error::Internal("something went wrong".to_string());
        let debug_str = format!("{err:?}");
        assert!(debug_str.contains("Internal"));
        assert!(debug_str.contains("something went wrong"));
    }

    #[test]
    fn test_error_propagation_with_question_mark() {
        fn inner() -> Result<i32> {
            Err(Error::config("inner error"))
        }

        fn outer() -> Result<i32> {
            let _ = inner()?;
            Ok(0)
        }

        let result = outer();
        assert_eq!(
            result.unwrap_err().to_string(),
            "configuration error: inner error"
        );
    }
}
