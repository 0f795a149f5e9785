//! Single-flight background parser.
//!
//! [`BackgroundParser`] turns a noisy stream of triggers into a sequence of
//! worker invocations, at most one running at a time, and publishes the
//! results together with a live "dirty" flag.
//!
//! All state lives behind one `parking_lot::Mutex`. Triggers, timer callbacks
//! and the driver task each take that lock, apply the debounce gate's verdict
//! and release it; nothing awaits while holding it. Admission writes into a
//! single-slot mailbox and wakes a dedicated driver task, which is the only
//! place a worker is started from.
//!
//! There is no timeout on worker execution: a worker that never settles keeps
//! the parser busy and every later trigger waits behind it.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::bus::ResultBus;
use super::gate::{DebounceGate, GateAction};
use super::state::{AdmittedRequest, ParserState, Phase};
use super::trigger::{Trigger, TriggerOrigin, TriggerSink};
use super::worker::{ParseFailure, ParseResult, Snapshot, Worker};
use crate::error::WorkerError;
use crate::observability::{spans, PARSES_TOTAL, PARSE_DURATION, SUPERSEDED_TOTAL, TRIGGERS_TOTAL};
use crate::{Error, Result};

/// Debounce delay for passive triggers.
pub const DEFAULT_REPARSE_DELAY: Duration = Duration::from_millis(1500);

/// Capacity of the result and failure channels.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Display name used in logs, spans and metric labels.
    pub name: String,
    /// Quiet period required before a delayed trigger is admitted.
    pub reparse_delay: Duration,
    /// Upper bound on how long a burst of delayed triggers can postpone a
    /// parse. `None` postpones indefinitely.
    pub max_debounce: Option<Duration>,
    /// Schedule a parse as soon as the parser is created.
    pub initial_parse: bool,
    /// Publish cancelled parses on the failure channel.
    pub report_cancellations: bool,
    /// Capacity of the result and failure channels.
    pub channel_capacity: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            name: "Background Parser".to_string(),
            reparse_delay: DEFAULT_REPARSE_DELAY,
            max_debounce: None,
            initial_parse: true,
            report_cancellations: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ParserConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config("parser name cannot be empty"));
        }

        if self.channel_capacity == 0 {
            return Err(Error::config("channel_capacity cannot be 0"));
        }

        if let Some(ceiling) = self.max_debounce {
            if ceiling < self.reparse_delay {
                return Err(Error::config(
                    "max_debounce cannot be shorter than reparse_delay",
                ));
            }
        }

        Ok(())
    }
}

/// Debounced, single-flight driver for a [`Worker`].
///
/// Cheap to clone; all clones share one state machine. Dropping the last
/// clone disposes it.
pub struct BackgroundParser<W: Worker> {
    inner: Arc<Inner<W>>,
}

impl<W: Worker> Clone for BackgroundParser<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

type Results<W> = ParseResult<<W as Worker>::Snapshot, <W as Worker>::Output>;

struct Inner<W: Worker> {
    name: String,
    worker: Arc<W>,
    report_cancellations: bool,
    state: Mutex<ParserState<W::Snapshot, W::Output>>,
    wakeup: Arc<Notify>,
    shutdown: CancellationToken,
    runtime: Handle,
}

impl<W: Worker> BackgroundParser<W> {
    /// Create a parser on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if called outside a Tokio runtime or if `config` is
    /// invalid.
    pub fn new(worker: W, config: ParserConfig) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::internal(format!("background parser needs a tokio runtime: {e}")))?;
        Self::with_handle(worker, config, runtime)
    }

    /// Create a parser whose timers and tasks run on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn with_handle(worker: W, config: ParserConfig, runtime: Handle) -> Result<Self> {
        config.validate()?;

        let gate = DebounceGate::new(config.reparse_delay, config.max_debounce);
        let bus = ResultBus::new(config.channel_capacity);
        let inner = Arc::new(Inner {
            name: config.name,
            worker: Arc::new(worker),
            report_cancellations: config.report_cancellations,
            state: Mutex::new(ParserState::new(gate, bus)),
            wakeup: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
            runtime,
        });

        let driver = Driver {
            inner: Arc::downgrade(&inner),
            wakeup: Arc::clone(&inner.wakeup),
            shutdown: inner.shutdown.clone(),
        };
        inner.runtime.spawn(driver.run());

        tracing::debug!(
            parser = %inner.name,
            reparse_delay_ms = config.reparse_delay.as_millis(),
            "Background parser started"
        );

        let parser = Self { inner };
        if config.initial_parse {
            parser.mark_dirty()?;
        }
        Ok(parser)
    }

    /// Display name of this parser.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Request a reparse after the debounce delay.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disposed`] after [`dispose`](Self::dispose).
    pub fn mark_dirty(&self) -> Result<()> {
        self.trigger(TriggerOrigin::MarkDirty)
    }

    /// Request a reparse as soon as no parse is running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disposed`] after [`dispose`](Self::dispose).
    pub fn reparse_now(&self) -> Result<()> {
        self.trigger(TriggerOrigin::ReparseNow)
    }

    /// Deliver a trigger of the given origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disposed`] after [`dispose`](Self::dispose).
    pub fn trigger(&self, origin: TriggerOrigin) -> Result<()> {
        self.inner.trigger(Trigger::now(origin))
    }

    /// Current debounce delay.
    #[must_use]
    pub fn reparse_delay(&self) -> Duration {
        self.inner.state.lock().gate.reparse_delay()
    }

    /// Change the debounce delay. Applies to timers armed from now on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disposed`] after [`dispose`](Self::dispose).
    pub fn set_reparse_delay(&self, delay: Duration) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return Err(Error::Disposed);
        }
        state.gate.set_reparse_delay(delay);
        Ok(())
    }

    /// Change the debounce delay from a signed millisecond count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for negative values and [`Error::Disposed`]
    /// after [`dispose`](Self::dispose).
    pub fn set_reparse_delay_ms(&self, millis: i64) -> Result<()> {
        let millis = u64::try_from(millis)
            .map_err(|_| Error::config(format!("reparse delay cannot be negative: {millis}ms")))?;
        self.set_reparse_delay(Duration::from_millis(millis))
    }

    /// Whether the last published result may be stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    /// Whether a worker is currently running.
    #[must_use]
    pub fn is_parsing(&self) -> bool {
        self.inner.state.lock().parsing
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase()
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Subscribe to completed parses, delivered in admission order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disposed`] after [`dispose`](Self::dispose).
    pub fn subscribe_results(&self) -> Result<broadcast::Receiver<Arc<Results<W>>>> {
        self.inner.with_bus(ResultBus::subscribe_results)
    }

    /// Subscribe to failed (and optionally cancelled) parses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disposed`] after [`dispose`](Self::dispose).
    pub fn subscribe_failures(&self) -> Result<broadcast::Receiver<ParseFailure>> {
        self.inner.with_bus(ResultBus::subscribe_failures)
    }

    /// Subscribe to the dirty flag. Only changes are signalled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disposed`] after [`dispose`](Self::dispose).
    pub fn subscribe_dirty(&self) -> Result<watch::Receiver<bool>> {
        self.inner.with_bus(ResultBus::subscribe_dirty)
    }

    /// Most recently published result, if any.
    #[must_use]
    pub fn latest_result(&self) -> Option<Arc<Results<W>>> {
        self.inner.state.lock().bus.as_ref().and_then(ResultBus::latest)
    }

    /// Stop the parser: cancel pending timers, signal the in-flight worker,
    /// close all subscriptions and reject further triggers.
    ///
    /// Idempotent.
    pub fn dispose(&self) {
        if self.inner.dispose() {
            tracing::info!(parser = %self.inner.name, "Background parser disposed");
        }
    }
}

impl<W: Worker> TriggerSink for BackgroundParser<W> {
    fn trigger(&self, origin: TriggerOrigin) -> Result<()> {
        Self::trigger(self, origin)
    }
}

impl<W: Worker> fmt::Debug for BackgroundParser<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BackgroundParser")
            .field("name", &self.inner.name)
            .field("phase", &state.phase())
            .field("dirty", &state.dirty)
            .field("reparse_delay", &state.gate.reparse_delay())
            .finish()
    }
}

impl<W: Worker> Inner<W> {
    fn with_bus<R>(&self, f: impl FnOnce(&ResultBus<W::Snapshot, W::Output>) -> R) -> Result<R> {
        let state = self.state.lock();
        state.bus.as_ref().map(f).ok_or(Error::Disposed)
    }

    fn trigger(self: &Arc<Self>, trigger: Trigger) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.disposed {
            return Err(Error::Disposed);
        }

        TRIGGERS_TOTAL
            .with_label_values(&[trigger.origin.as_str()])
            .inc();
        state.set_dirty(true);
        state.cancel_timer();
        if let Some(superseded) = state.pending.take() {
            SUPERSEDED_TOTAL.inc();
            tracing::trace!(parser = %self.name, seq = superseded.seq, "Pending parse superseded");
        }

        let action = state.gate.on_trigger(trigger, state.parsing);
        tracing::trace!(parser = %self.name, origin = %trigger.origin, ?action, "Trigger received");
        self.apply(state, action);
        Ok(())
    }

    fn on_timer(self: &Arc<Self>, generation: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.disposed {
            return;
        }

        let action = state.gate.on_timer(generation, state.parsing);
        if !state.gate.is_armed() {
            // This timer's own handle; it has already fired.
            state.timer = None;
        }
        self.apply(state, action);
    }

    fn apply(self: &Arc<Self>, state: &mut ParserState<W::Snapshot, W::Output>, action: GateAction) {
        match action {
            GateAction::Hold => {}
            GateAction::Arm {
                generation,
                deadline,
            } => {
                state.cancel_timer();
                let inner = Arc::downgrade(self);
                state.timer = Some(self.runtime.spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    if let Some(inner) = inner.upgrade() {
                        inner.on_timer(generation);
                    }
                }));
            }
            GateAction::Admit { generation, origin } => {
                let snapshot = Arc::new(self.worker.snapshot());
                let version = snapshot.version();
                let (seq, superseded) = state.admit(generation, origin, snapshot);
                if superseded {
                    SUPERSEDED_TOTAL.inc();
                }
                tracing::debug!(parser = %self.name, seq, version, %origin, "Parse admitted");
                self.wakeup.notify_one();
            }
        }
    }

    async fn execute(self: &Arc<Self>, request: AdmittedRequest<W::Snapshot>) {
        let token = self.shutdown.child_token();
        let worker = Arc::clone(&self.worker);
        let snapshot = Arc::clone(&request.snapshot);
        let span = spans::parse_span(
            &self.name,
            request.seq,
            snapshot.version(),
            request.origin.as_str(),
        );
        let started = Instant::now();

        let mut task = self
            .runtime
            .spawn(async move { worker.parse(snapshot, token).await }.instrument(span));

        let joined = tokio::select! {
            biased;
            joined = &mut task => joined,
            () = self.shutdown.cancelled() => {
                tracing::debug!(parser = %self.name, seq = request.seq, "Abandoning in-flight parse");
                return;
            }
        };

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => {
                Err(WorkerError::Panicked(panic_message(err.into_panic().as_ref())))
            }
            Err(_) => Err(WorkerError::Cancelled),
        };
        self.finish(request, outcome, started.elapsed());
    }

    fn finish(
        self: &Arc<Self>,
        request: AdmittedRequest<W::Snapshot>,
        outcome: std::result::Result<W::Output, WorkerError>,
        elapsed: Duration,
    ) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.parsing = false;
        if state.disposed {
            return;
        }

        PARSE_DURATION
            .with_label_values(&[self.name.as_str()])
            .observe(elapsed.as_secs_f64());
        let seq = request.seq;
        let origin = request.origin;
        let version = request.snapshot.version();

        match outcome {
            Ok(value) if state.accept_delivery(seq) => {
                let current = state.is_current(&request);
                let result = Arc::new(ParseResult {
                    seq,
                    snapshot: request.snapshot,
                    value,
                    elapsed,
                });
                if let Some(bus) = state.bus.as_mut() {
                    bus.publish_result(result);
                }
                if current {
                    state.set_dirty(false);
                }
                PARSES_TOTAL.with_label_values(&["completed"]).inc();
                tracing::debug!(
                    parser = %self.name,
                    seq,
                    version,
                    %origin,
                    elapsed_ms = elapsed.as_millis(),
                    current,
                    "Parse completed"
                );
            }
            Ok(_) => {
                PARSES_TOTAL.with_label_values(&["discarded"]).inc();
                tracing::debug!(parser = %self.name, seq, "Discarding result older than one already delivered");
            }
            Err(error) => {
                let cancelled = error.is_cancelled();
                if cancelled {
                    PARSES_TOTAL.with_label_values(&["cancelled"]).inc();
                    tracing::debug!(parser = %self.name, seq, "Parse cancelled");
                } else {
                    PARSES_TOTAL.with_label_values(&["failed"]).inc();
                    tracing::warn!(parser = %self.name, seq, version, %error, "Parse failed");
                }
                if !cancelled || self.report_cancellations {
                    if let Some(bus) = state.bus.as_ref() {
                        bus.publish_failure(ParseFailure {
                            seq,
                            version,
                            error,
                            elapsed,
                        });
                    }
                }
            }
        }

        let action = state.gate.on_idle(Instant::now());
        self.apply(state, action);
    }

    /// Returns false if already disposed.
    fn dispose(&self) -> bool {
        let mut state = self.state.lock();
        if state.disposed {
            return false;
        }
        state.disposed = true;
        state.parsing = false;
        state.cancel_timer();
        state.gate.cancel();
        state.pending = None;
        state.bus = None;
        drop(state);

        self.shutdown.cancel();
        true
    }
}

impl<W: Worker> Drop for Inner<W> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.cancel_timer();
        state.disposed = true;
        self.shutdown.cancel();
    }
}

/// The one task that starts workers.
struct Driver<W: Worker> {
    inner: Weak<Inner<W>>,
    wakeup: Arc<Notify>,
    shutdown: CancellationToken,
}

impl<W: Worker> Driver<W> {
    async fn run(self) {
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                () = self.wakeup.notified() => {}
            }

            let Some(inner) = self.inner.upgrade() else {
                break;
            };
            let request = inner.state.lock().begin();
            if let Some(request) = request {
                inner.execute(request).await;
            }
        }
        tracing::trace!("Background parser driver stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
