//! Binary settings: command line, environment and TOML file.

mod cli;
pub mod serde_helpers;
mod validation;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cli::Config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Collection URL is not valid: {0}")]
    InvalidUrl(String),
    #[error("Setting {field} rejected: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("Could not read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Config file is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Default verbosity of the log subscriber, also used by filter directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Case-insensitive; `warning` is accepted for `warn`.
    pub fn parse_lenient(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "warning" => Some(LogLevel::Warn),
            other => <LogLevel as ValueEnum>::from_str(other, true).ok(),
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    /// One JSON object per line
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_level_parsing() {
        assert_eq!(LogLevel::parse_lenient("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse_lenient(" debug "), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse_lenient("loud"), None);
        assert_eq!(LogLevel::Trace.as_str(), "trace");
    }
}
