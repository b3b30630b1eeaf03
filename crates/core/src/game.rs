use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::group::GroupId;

/// Outcome of one completed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Player,
    Tie,
    Banker,
}

/// A result string that is not one of the three known outcomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown outcome {0:?}")]
pub struct OutcomeParseError(pub String);

impl FromStr for Outcome {
    type Err = OutcomeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "player" => Ok(Outcome::Player),
            "tie" => Ok(Outcome::Tie),
            "banker" => Ok(Outcome::Banker),
            other => Err(OutcomeParseError(other.to_string())),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Player => "player",
            Outcome::Tie => "tie",
            Outcome::Banker => "banker",
        };
        write!(f, "{}", name)
    }
}

/// Score text that does not parse as a non-negative integer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("score is not a non-negative integer: {0:?}")]
pub struct ScoreParseError(pub String);

/// Strict score conversion. The vendor sends scores as numeric strings;
/// anything that does not parse whole is rejected rather than stored.
pub fn parse_score(text: &str) -> Result<u32, ScoreParseError> {
    text.trim()
        .parse::<u32>()
        .map_err(|_| ScoreParseError(text.to_string()))
}

/// One round outcome, ready for the persistence collaborator.
///
/// `group` is the shuffle group that was current when the frame arrived
/// and never changes afterwards. The write timestamp is assigned by the
/// store, not carried here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub external_id: String,
    pub table: String,
    pub result: Outcome,
    pub score: u32,
    pub group: GroupId,
}
