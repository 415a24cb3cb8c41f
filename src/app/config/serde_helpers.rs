//! Durations are written as milliseconds in config files and on the
//! command line.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// clap value parser for millisecond durations.
pub fn parse_millis(value: &str) -> Result<Duration, String> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| format!("Invalid duration in milliseconds '{value}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Wrapper {
        #[serde(with = "super")]
        timeout: Duration,
    }

    #[test]
    fn test_millis_in_toml() {
        let parsed: Wrapper = toml::from_str("timeout = 1500").unwrap();
        assert_eq!(parsed.timeout, Duration::from_millis(1500));
        assert_eq!(toml::to_string(&parsed).unwrap().trim(), "timeout = 1500");
    }

    #[test]
    fn test_parse_millis() {
        assert_eq!(parse_millis(" 250 "), Ok(Duration::from_millis(250)));
        assert!(parse_millis("2s").is_err());
    }
}
