//! State shared by every path into the parser, guarded by one lock.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::bus::ResultBus;
use super::gate::DebounceGate;
use super::trigger::TriggerOrigin;

/// Observable lifecycle phase of a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing scheduled and no worker running.
    Idle,
    /// A delay timer is pending.
    Debouncing,
    /// A request is admitted and waiting for the driver to start it.
    Pending,
    /// A worker is running.
    Parsing,
    /// Terminal.
    Disposed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Debouncing => "debouncing",
            Self::Pending => "pending",
            Self::Parsing => "parsing",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// A request that passed the gate, with the snapshot captured at admission.
pub(crate) struct AdmittedRequest<S> {
    pub seq: u64,
    /// Gate generation at admission; unchanged means no trigger since.
    pub generation: u64,
    pub origin: TriggerOrigin,
    pub snapshot: Arc<S>,
}

pub(crate) struct ParserState<S, T> {
    pub gate: DebounceGate,
    pub parsing: bool,
    pub dirty: bool,
    pub disposed: bool,
    next_seq: u64,
    latest_admitted: u64,
    latest_delivered: u64,
    /// Single-slot mailbox between admission and the driver.
    pub pending: Option<AdmittedRequest<S>>,
    pub timer: Option<JoinHandle<()>>,
    /// `None` once disposed.
    pub bus: Option<ResultBus<S, T>>,
}

impl<S, T> ParserState<S, T> {
    pub(crate) fn new(gate: DebounceGate, bus: ResultBus<S, T>) -> Self {
        Self {
            gate,
            parsing: false,
            dirty: false,
            disposed: false,
            next_seq: 1,
            latest_admitted: 0,
            latest_delivered: 0,
            pending: None,
            timer: None,
            bus: Some(bus),
        }
    }

    pub(crate) const fn phase(&self) -> Phase {
        if self.disposed {
            Phase::Disposed
        } else if self.parsing {
            Phase::Parsing
        } else if self.pending.is_some() {
            Phase::Pending
        } else if self.gate.is_armed() {
            Phase::Debouncing
        } else {
            Phase::Idle
        }
    }

    /// Update the dirty flag, notifying subscribers only on change.
    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        if self.dirty == dirty {
            return;
        }
        self.dirty = dirty;
        if let Some(bus) = &self.bus {
            bus.publish_dirty(dirty);
        }
    }

    /// Put a request in the pending slot, replacing any undelivered one.
    ///
    /// Returns the new sequence number and whether a request was superseded.
    pub(crate) fn admit(
        &mut self,
        generation: u64,
        origin: TriggerOrigin,
        snapshot: Arc<S>,
    ) -> (u64, bool) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.latest_admitted = seq;
        let superseded = self
            .pending
            .replace(AdmittedRequest {
                seq,
                generation,
                origin,
                snapshot,
            })
            .is_some();
        (seq, superseded)
    }

    /// Hand the pending request to the driver, marking the parser busy.
    pub(crate) fn begin(&mut self) -> Option<AdmittedRequest<S>> {
        if self.disposed || self.parsing {
            return None;
        }
        let request = self.pending.take()?;
        self.parsing = true;
        Some(request)
    }

    /// Record a delivery for `seq`; false if a newer result already landed.
    pub(crate) fn accept_delivery(&mut self, seq: u64) -> bool {
        if seq <= self.latest_delivered {
            return false;
        }
        self.latest_delivered = seq;
        true
    }

    /// Whether a result for `request` reflects every trigger received so far.
    pub(crate) const fn is_current(&self, request: &AdmittedRequest<S>) -> bool {
        request.seq == self.latest_admitted && request.generation == self.gate.generation()
    }

    pub(crate) fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
