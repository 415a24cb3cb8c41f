use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One serialized unit of telemetry.
///
/// Immutable once built except for `retry_count`, which is owned by whoever
/// drives resends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub is_offline: bool,
}

impl Hit {
    pub fn new(url: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            created_at,
            retry_count: 0,
            is_offline: false,
        }
    }

    /// Original local time of the hit, in the same format as `ts`.
    pub fn olt(&self) -> String {
        format_timestamp(self.created_at)
    }
}

/// Seconds since the epoch with microsecond precision (`1700000000.123456`).
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitStatus {
    Success,
    Failed,
}

impl fmt::Display for HitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HitStatus::Success => write!(f, "success"),
            HitStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Offline policy read from the `storage` configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfflineMode {
    /// Every hit goes to storage; the queue is only drained on request.
    Always,
    /// Best effort only, nothing is ever persisted.
    Never,
    /// Persist only when the network is unavailable or delivery fails.
    #[default]
    Required,
}

impl OfflineMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OfflineMode::Always => "always",
            OfflineMode::Never => "never",
            OfflineMode::Required => "required",
        }
    }
}

impl fmt::Display for OfflineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfflineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(OfflineMode::Always),
            "never" => Ok(OfflineMode::Never),
            "required" => Ok(OfflineMode::Required),
            other => Err(format!("Unknown offline mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format_keeps_microseconds() {
        let at = Utc.timestamp_opt(1_700_000_000, 42_000).single().unwrap();
        assert_eq!(format_timestamp(at), "1700000000.000042");

        let hit = Hit::new("http://example.com", at);
        assert_eq!(hit.olt(), "1700000000.000042");
        assert_eq!(hit.retry_count, 0);
        assert!(!hit.is_offline);
    }

    #[test]
    fn test_offline_mode_parsing() {
        assert_eq!("always".parse::<OfflineMode>().unwrap(), OfflineMode::Always);
        assert_eq!("NEVER".parse::<OfflineMode>().unwrap(), OfflineMode::Never);
        assert_eq!("required".parse::<OfflineMode>().unwrap(), OfflineMode::Required);
        assert!("sometimes".parse::<OfflineMode>().is_err());
        assert_eq!(OfflineMode::default(), OfflineMode::Required);
    }
}
