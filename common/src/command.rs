use thiserror::Error;

use crate::types::ActuatorState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,
    #[error("payload is empty")]
    Empty,
    #[error("payload has no value field: {0:?}")]
    MissingValue(String),
    #[error("unrecognized actuator value: {0:?}")]
    UnknownValue(String),
}

/// Parses a dashboard actuator command.
///
/// The payload is a comma-separated pair `<sequenceId>,<value>` (e.g.
/// `2otoExGxnMJz0Jn,1`). The sequence id length is not fixed, so the value is
/// taken as the token after the last comma rather than at a byte offset:
/// `0` switches the actuator off, `1` switches it on. Anything else is a
/// typed error and must not change the actuator.
pub fn parse_actuator_command(payload: &[u8]) -> Result<ActuatorState, CommandError> {
    let text = std::str::from_utf8(payload).map_err(|_| CommandError::NotUtf8)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CommandError::Empty);
    }

    let Some((_, value)) = trimmed.rsplit_once(',') else {
        return Err(CommandError::MissingValue(trimmed.to_string()));
    };

    match value.trim() {
        "0" => Ok(ActuatorState::Off),
        "1" => Ok(ActuatorState::On),
        other => Err(CommandError::UnknownValue(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn dashboard_on_command_parses() {
        assert_eq!(
            parse_actuator_command(b"2otoExGxnMJz0Jn,1"),
            Ok(ActuatorState::On)
        );
    }

    #[test]
    fn dashboard_off_command_parses() {
        assert_eq!(
            parse_actuator_command(b"2otoExGxnMJz0Jn,0"),
            Ok(ActuatorState::Off)
        );
    }

    #[test]
    fn sequence_id_length_does_not_matter() {
        assert_eq!(parse_actuator_command(b"x,1"), Ok(ActuatorState::On));
        assert_eq!(
            parse_actuator_command(b"averyveryverylongsequenceidentifier,0"),
            Ok(ActuatorState::Off)
        );
    }

    #[test]
    fn value_after_last_comma_wins() {
        assert_eq!(parse_actuator_command(b"a,b,1"), Ok(ActuatorState::On));
    }

    #[test]
    fn whitespace_around_value_is_tolerated() {
        assert_eq!(
            parse_actuator_command(b"2otoExGxnMJz0Jn, 1 "),
            Ok(ActuatorState::On)
        );
    }

    #[test]
    fn short_payloads_never_panic_and_never_parse() {
        for payload in [&b""[..], b"0", b"1", b"x", b"2otoExGx"] {
            assert!(parse_actuator_command(payload).is_err());
        }
    }

    #[test]
    fn empty_payload_is_reported_as_empty() {
        assert_eq!(parse_actuator_command(b"   "), Err(CommandError::Empty));
    }

    #[test]
    fn missing_comma_is_a_missing_value() {
        assert_eq!(
            parse_actuator_command(b"2otoExGxnMJz0Jn1"),
            Err(CommandError::MissingValue("2otoExGxnMJz0Jn1".to_string()))
        );
    }

    #[test]
    fn unknown_values_are_rejected() {
        assert_eq!(
            parse_actuator_command(b"seq,2"),
            Err(CommandError::UnknownValue("2".to_string()))
        );
        assert_eq!(
            parse_actuator_command(b"seq,on"),
            Err(CommandError::UnknownValue("on".to_string()))
        );
        assert_eq!(
            parse_actuator_command(b"seq,"),
            Err(CommandError::UnknownValue(String::new()))
        );
    }

    #[test]
    fn non_utf8_payload_is_rejected() {
        assert_eq!(
            parse_actuator_command(&[0xff, 0xfe, b',', b'1']),
            Err(CommandError::NotUtf8)
        );
    }
}
