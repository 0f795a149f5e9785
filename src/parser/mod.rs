//! Debounced background re-computation.
//!
//! A [`BackgroundParser`] owns a [`Worker`] and decides when to run it:
//!
//! - passive triggers (content or filesystem changes, [`mark_dirty`]) wait
//!   for a quiet period of `reparse_delay` after the parser is idle
//! - [`reparse_now`] runs as soon as the parser is idle
//! - at most one worker runs at a time, always against the newest snapshot
//!
//! Results, failures and the dirty flag are published to any number of
//! subscribers.
//!
//! [`mark_dirty`]: BackgroundParser::mark_dirty
//! [`reparse_now`]: BackgroundParser::reparse_now

mod bus;
mod gate;
mod scheduler;
mod state;
mod trigger;
mod worker;

pub use scheduler::{BackgroundParser, ParserConfig, DEFAULT_REPARSE_DELAY};
pub use state::Phase;
pub use trigger::{Policy, Trigger, TriggerOrigin, TriggerSink};
pub use worker::{ParseFailure, ParseResult, Snapshot, Worker};
