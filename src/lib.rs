//! diffwatch library
//!
//! Keeps a document's diff against git fresh in the background: edits and
//! repository changes are debounced into at most one running diff at a time,
//! with results and a live "dirty" flag published to subscribers.
//!
//! The scheduling engine in [`parser`] is independent of git and can drive
//! any [`parser::Worker`].

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod document;
pub mod error;
pub mod git;
pub mod observability;
pub mod parser;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
