// src/config/duration.rs
// Duration grammar: `^[0-9]+[smhdw]$`, integer >= 0.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DURATION_RE: Regex = Regex::new(r"^([0-9]+)([smhdw])$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationParseError {
    pub input: String,
}

impl fmt::Display for DurationParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid duration string: {:?}", self.input)
    }
}

impl std::error::Error for DurationParseError {}

/// Multiplier in milliseconds for each unit letter.
fn unit_multiplier_ms(unit: char) -> Option<i64> {
    match unit {
        's' => Some(1_000),
        'm' => Some(60_000),
        'h' => Some(3_600_000),
        'd' => Some(86_400_000),
        'w' => Some(604_800_000),
        _ => None,
    }
}

/// Parses a duration string like `30s`, `5m`, `1h`, `7d`, `2w` into milliseconds.
/// Defined only on `^[0-9]+[smhdw]$`; anything else is a `DurationParseError`.
pub fn parse_duration(s: &str) -> Result<i64, DurationParseError> {
    let caps = DURATION_RE
        .captures(s)
        .ok_or_else(|| DurationParseError { input: s.to_string() })?;

    let value: i64 = caps[1]
        .parse()
        .map_err(|_| DurationParseError { input: s.to_string() })?;
    let unit = caps[2].chars().next().unwrap();
    let multiplier = unit_multiplier_ms(unit).ok_or_else(|| DurationParseError { input: s.to_string() })?;

    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("0s").unwrap(), 0);
        assert_eq!(parse_duration("30s").unwrap(), 30_000);
        assert_eq!(parse_duration("5m").unwrap(), 300_000);
        assert_eq!(parse_duration("1h").unwrap(), 3_600_000);
        assert_eq!(parse_duration("7d").unwrap(), 604_800_000);
        assert_eq!(parse_duration("2w").unwrap(), 1_209_600_000);
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("m5").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("5.5s").is_err());
        assert!(parse_duration("5y").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn injective_within_a_unit() {
        // For a fixed unit, distinct integer values never collide on ms.
        assert_ne!(parse_duration("3h").unwrap(), parse_duration("4h").unwrap());
        assert_ne!(parse_duration("1w").unwrap(), parse_duration("2w").unwrap());
    }
}
