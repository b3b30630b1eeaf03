//! Shoefeed Core Domain
//!
//! Pure domain types for the shoefeed ingestion worker.
//! This crate contains no async, no I/O, and is 100% unit testable.

mod game;
mod group;

pub use game::{GameResult, Outcome, OutcomeParseError, ScoreParseError, parse_score};
pub use group::{GroupId, GroupTracker};
