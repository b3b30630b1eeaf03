use shoefeed_core::{GameResult, GroupId, Outcome, parse_score};

use super::{ProtocolError, ResultPayload};

/// Convert a decoded result payload into a persistable record, tagged
/// with the group id snapshotted at dispatch time.
///
/// Performs no I/O. Both the outcome string and the score text are
/// converted strictly; a payload the vendor half-filled fails the frame
/// instead of producing a defaulted record.
pub fn map_result(payload: ResultPayload, group: GroupId) -> Result<GameResult, ProtocolError> {
    let result: Outcome = payload.result.parse()?;
    let score = parse_score(&payload.score)?;

    Ok(GameResult {
        external_id: payload.id,
        table: payload.table,
        result,
        score,
        group,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(result: &str, score: &str) -> ResultPayload {
        ResultPayload {
            id: "r-1001".to_string(),
            table: "t42".to_string(),
            result: result.to_string(),
            score: score.to_string(),
        }
    }

    #[test]
    fn test_maps_well_formed_payload() {
        let game = map_result(payload("banker", "8"), GroupId::new("grp-a")).unwrap();
        assert_eq!(game.external_id, "r-1001");
        assert_eq!(game.table, "t42");
        assert_eq!(game.result, Outcome::Banker);
        assert_eq!(game.score, 8);
        assert_eq!(game.group, GroupId::new("grp-a"));
    }

    #[test]
    fn test_non_numeric_score_fails_the_frame() {
        assert!(matches!(
            map_result(payload("player", "abc"), GroupId::new("grp-a")),
            Err(ProtocolError::Score(_))
        ));
    }

    #[test]
    fn test_unknown_result_fails_the_frame() {
        assert!(matches!(
            map_result(payload("dragon", "3"), GroupId::new("grp-a")),
            Err(ProtocolError::Outcome(_))
        ));
    }

    #[test]
    fn test_record_keeps_the_supplied_group() {
        let game = map_result(payload("tie", "0"), GroupId::new("snapshot")).unwrap();
        assert_eq!(game.group.as_str(), "snapshot");
    }
}
