//! Trigger events and the sink they are delivered to.

use std::fmt;

use tokio::time::Instant;

use crate::Result;

/// Where a trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerOrigin {
    /// The document's text changed.
    ContentChanged,
    /// Something changed in the backing repository on disk.
    FilesystemChanged,
    /// A collaborator asked for a deferred reparse.
    MarkDirty,
    /// A collaborator asked for a reparse as soon as the parser is idle.
    ReparseNow,
}

/// Admission policy applied by the debounce gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Wait for idle, then wait `reparse_delay` with no further triggers.
    Delayed,
    /// Admit as soon as the parser is idle.
    Immediate,
}

impl TriggerOrigin {
    /// Policy used for triggers of this origin.
    #[must_use]
    pub const fn policy(self) -> Policy {
        match self {
            Self::ReparseNow => Policy::Immediate,
            Self::ContentChanged | Self::FilesystemChanged | Self::MarkDirty => Policy::Delayed,
        }
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContentChanged => "content_changed",
            Self::FilesystemChanged => "filesystem_changed",
            Self::MarkDirty => "mark_dirty",
            Self::ReparseNow => "reparse_now",
        }
    }
}

impl fmt::Display for TriggerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signal that the tracked artifact may be stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    /// Origin of the trigger.
    pub origin: TriggerOrigin,
    /// When the trigger was raised.
    pub at: Instant,
}

impl Trigger {
    /// Create a trigger stamped with the current time.
    #[must_use]
    pub fn now(origin: TriggerOrigin) -> Self {
        Self {
            origin,
            at: Instant::now(),
        }
    }

    /// Policy for this trigger.
    #[must_use]
    pub const fn policy(&self) -> Policy {
        self.origin.policy()
    }
}

/// Receiver of trigger events.
///
/// Implemented by [`BackgroundParser`](super::BackgroundParser); collaborators
/// such as the repository watcher hold it as a trait object so they stay
/// independent of the worker type.
pub trait TriggerSink: Send + Sync {
    /// Deliver a trigger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disposed`](crate::Error::Disposed) once the sink no
    /// longer accepts triggers.
    fn trigger(&self, origin: TriggerOrigin) -> Result<()>;
}
