//! The edited document.
//!
//! A [`TextBuffer`] holds the current text of one file, bumps a version on
//! every change, and hands out cheap immutable [`DocumentSnapshot`]s for
//! background parses.

mod buffer;

pub use buffer::{DocumentSnapshot, TextBuffer};
