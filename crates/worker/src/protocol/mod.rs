//! Inbound frame classification and result mapping.
//!
//! The feed mixes two encodings: compact JSON envelopes keyed by an event
//! name, and lightweight markup tags. Classification tries the known
//! shapes in priority order against the leading content; traffic matching
//! none of them is ignored, but a frame that matches a known shape and
//! then fails strict field decoding is a protocol error.

mod classify;
mod mapper;

pub use classify::{Inbound, ResultPayload, classify};
pub use mapper::map_result;

use shoefeed_core::{OutcomeParseError, ScoreParseError};
use thiserror::Error;

/// A frame matched a known envelope shape but its required fields could
/// not be decoded.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed {kind} envelope: {source}")]
    Envelope {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Outcome(#[from] OutcomeParseError),

    #[error(transparent)]
    Score(#[from] ScoreParseError),
}
