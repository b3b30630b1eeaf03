use serde::Deserialize;

use super::ProtocolError;

/// Tag that opens a session-end notice.
const SESSION_TAG: &str = "<session>";

/// Envelope key of a completed round.
const GAME_RESULT_KEY: &str = "gameresult";

/// Envelope key of a shuffle-start notice.
const START_SHUFFLING_KEY: &str = "startshuffling";

/// One classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A completed round. The score is still the vendor's numeric string
    /// here; strict conversion happens in the mapper.
    GameResult(ResultPayload),
    /// The dealer began a reshuffle; the current group ends.
    StartShuffling,
    /// The upstream connection session is ending. Body kept for logging,
    /// not otherwise parsed.
    SessionEnd(String),
    /// Feed traffic the worker does not consume.
    Ignored,
}

/// Raw game-result payload as the vendor sends it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResultPayload {
    pub id: String,
    pub table: String,
    pub result: String,
    pub score: String,
}

#[derive(Deserialize)]
struct GameResultEnvelope {
    gameresult: ResultPayload,
}

/// Decide what an inbound frame is.
pub fn classify(frame: &str) -> Result<Inbound, ProtocolError> {
    if frame.starts_with(SESSION_TAG) {
        return Ok(Inbound::SessionEnd(frame.to_string()));
    }

    match envelope_key(frame) {
        Some(GAME_RESULT_KEY) => {
            let envelope: GameResultEnvelope =
                serde_json::from_str(frame).map_err(|source| ProtocolError::Envelope {
                    kind: GAME_RESULT_KEY,
                    source,
                })?;
            Ok(Inbound::GameResult(envelope.gameresult))
        }
        // Nothing in the shuffle-start payload is consumed downstream;
        // the fact of the event is all that matters.
        Some(START_SHUFFLING_KEY) => Ok(Inbound::StartShuffling),
        _ => Ok(Inbound::Ignored),
    }
}

/// Key of a compact JSON envelope: the frame must open with `{"key"`.
fn envelope_key(frame: &str) -> Option<&str> {
    let rest = frame.strip_prefix("{\"")?;
    let key = &rest[..rest.find('"')?];
    if !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(key)
    } else {
        None
    }
}
