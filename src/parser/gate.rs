//! Debounce gate: decides when a trigger becomes an admitted request.
//!
//! The gate is plain data driven by the parser under its state lock. It never
//! sleeps itself; it answers each event with a [`GateAction`] that the parser
//! carries out (arming a timer or admitting a request).
//!
//! Every trigger bumps the generation, which supersedes whatever the gate was
//! holding: an armed timer from an older generation is ignored when it fires,
//! and a trigger waiting for idle is replaced.

use std::time::Duration;

use tokio::time::Instant;

use super::trigger::{Policy, Trigger, TriggerOrigin};

/// What the parser must do after feeding an event to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateAction {
    /// Nothing to do yet.
    Hold,
    /// Start the delay timer for `generation`, firing at `deadline`.
    Arm { generation: u64, deadline: Instant },
    /// Admit a request now.
    Admit {
        generation: u64,
        origin: TriggerOrigin,
    },
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    generation: u64,
    origin: TriggerOrigin,
}

/// A trigger that arrived while a parse was running.
#[derive(Debug, Clone, Copy)]
struct Waiting {
    origin: TriggerOrigin,
    policy: Policy,
}

#[derive(Debug)]
pub(crate) struct DebounceGate {
    generation: u64,
    reparse_delay: Duration,
    max_debounce: Option<Duration>,
    armed: Option<Armed>,
    waiting: Option<Waiting>,
    /// First trigger not yet admitted; anchors the optional ceiling.
    burst_started: Option<Instant>,
}

impl DebounceGate {
    pub(crate) const fn new(reparse_delay: Duration, max_debounce: Option<Duration>) -> Self {
        Self {
            generation: 0,
            reparse_delay,
            max_debounce,
            armed: None,
            waiting: None,
            burst_started: None,
        }
    }

    pub(crate) const fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) const fn reparse_delay(&self) -> Duration {
        self.reparse_delay
    }

    /// Takes effect for the next timer armed.
    pub(crate) fn set_reparse_delay(&mut self, delay: Duration) {
        self.reparse_delay = delay;
    }

    pub(crate) const fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    #[cfg(test)]
    pub(crate) const fn is_waiting(&self) -> bool {
        self.waiting.is_some()
    }

    /// Feed a new trigger.
    pub(crate) fn on_trigger(&mut self, trigger: Trigger, parsing: bool) -> GateAction {
        self.generation += 1;
        self.armed = None;
        self.waiting = None;
        self.burst_started.get_or_insert(trigger.at);

        if parsing {
            self.waiting = Some(Waiting {
                origin: trigger.origin,
                policy: trigger.policy(),
            });
            return GateAction::Hold;
        }

        match trigger.policy() {
            Policy::Immediate => self.admit(trigger.origin),
            Policy::Delayed => self.arm(trigger.origin, trigger.at),
        }
    }

    /// The running parse settled.
    pub(crate) fn on_idle(&mut self, now: Instant) -> GateAction {
        let Some(waiting) = self.waiting.take() else {
            return GateAction::Hold;
        };

        match waiting.policy {
            Policy::Immediate => self.admit(waiting.origin),
            Policy::Delayed => self.arm(waiting.origin, now),
        }
    }

    /// A delay timer armed for `generation` elapsed.
    pub(crate) fn on_timer(&mut self, generation: u64, parsing: bool) -> GateAction {
        let armed = match self.armed {
            Some(armed) if armed.generation == generation => armed,
            _ => return GateAction::Hold,
        };
        self.armed = None;

        if parsing {
            // Already waited out the delay; only the idle gate remains.
            self.waiting = Some(Waiting {
                origin: armed.origin,
                policy: Policy::Immediate,
            });
            return GateAction::Hold;
        }

        self.admit(armed.origin)
    }

    /// Drop everything the gate is holding.
    pub(crate) fn cancel(&mut self) {
        self.armed = None;
        self.waiting = None;
        self.burst_started = None;
    }

    fn arm(&mut self, origin: TriggerOrigin, now: Instant) -> GateAction {
        let mut deadline = now + self.reparse_delay;
        if let (Some(ceiling), Some(started)) = (self.max_debounce, self.burst_started) {
            deadline = deadline.min((started + ceiling).max(now));
        }

        self.armed = Some(Armed {
            generation: self.generation,
            origin,
        });
        GateAction::Arm {
            generation: self.generation,
            deadline,
        }
    }

    fn admit(&mut self, origin: TriggerOrigin) -> GateAction {
        self.burst_started = None;
        GateAction::Admit {
            generation: self.generation,
            origin,
        }
    }
}
