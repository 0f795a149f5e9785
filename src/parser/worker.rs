//! Worker contract and the values it produces.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;

/// Immutable view of the document a parse runs against.
pub trait Snapshot: Send + Sync + 'static {
    /// Version identifier of the document state this snapshot captures.
    fn version(&self) -> u64;
}

/// The pluggable computation driven by [`BackgroundParser`](super::BackgroundParser).
pub trait Worker: Send + Sync + 'static {
    /// Snapshot type captured at admission time.
    type Snapshot: Snapshot;
    /// Value produced by a successful parse.
    type Output: Send + Sync + 'static;

    /// Capture the current document state.
    ///
    /// Called while the parser's state lock is held, so it must be cheap and
    /// must not call back into the parser.
    fn snapshot(&self) -> Self::Snapshot;

    /// Compute a result for `snapshot`.
    ///
    /// Cancellation is cooperative: implementations check `cancel` and return
    /// [`WorkerError::Cancelled`] promptly instead of a result once it fires.
    fn parse(
        &self,
        snapshot: Arc<Self::Snapshot>,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Self::Output, WorkerError>> + Send;
}

/// A completed parse.
#[derive(Debug)]
pub struct ParseResult<S, T> {
    /// Admission sequence number of the request that produced this result.
    pub seq: u64,
    /// Snapshot the result was computed from.
    pub snapshot: Arc<S>,
    /// Worker output.
    pub value: T,
    /// Wall-clock time the worker took.
    pub elapsed: Duration,
}

impl<S: Snapshot, T> ParseResult<S, T> {
    /// Version of the snapshot this result describes.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }
}

/// A parse that ended without a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    /// Admission sequence number of the failed request.
    pub seq: u64,
    /// Version of the snapshot the worker was given.
    pub version: u64,
    /// Why the worker stopped.
    pub error: WorkerError,
    /// Wall-clock time until the worker settled.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u64);

    impl Snapshot for Fixed {
        fn version(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn test_parse_result_version_comes_from_snapshot() {
        let result = ParseResult {
            seq: 3,
            snapshot: Arc::new(Fixed(42)),
            value: "hunks",
            elapsed: Duration::from_millis(12),
        };
        assert_eq!(result.version(), 42);
        assert_eq!(result.seq, 3);
    }
}
