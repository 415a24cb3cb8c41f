//! `target=level` filter directives for the log subscriber.

use thiserror::Error;

use super::config::LogLevel;

#[derive(Error, Debug)]
pub enum InitializationError {
    #[error("Unknown level '{level}' in directive '{directive}'")]
    UnknownLevel { directive: String, level: String },

    #[error("Directive '{0}' is not of the form target=level")]
    MalformedDirective(String),

    #[error("Directive '{0}' has no target")]
    EmptyTarget(String),

    #[error("Could not install log subscriber: {details}")]
    Subscriber {
        details: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// What the logging system does with a directive it could not use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Keep the target at the fallback level.
    FallbackLevel,
    Skip,
    Fail,
}

impl InitializationError {
    pub fn recovery(&self) -> Recovery {
        match self {
            InitializationError::UnknownLevel { .. } => Recovery::FallbackLevel,
            InitializationError::MalformedDirective(_) | InitializationError::EmptyTarget(_) => Recovery::Skip,
            InitializationError::Subscriber { .. } => Recovery::Fail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDirective {
    pub target: String,
    pub level: LogLevel,
}

impl LogDirective {
    pub fn new(target: impl Into<String>, level: LogLevel) -> Self {
        Self {
            target: target.into(),
            level,
        }
    }

    pub fn parse(directive: &str) -> Result<Self, InitializationError> {
        let malformed = || InitializationError::MalformedDirective(directive.to_string());

        let (target, level) = directive.split_once('=').ok_or_else(malformed)?;
        if level.contains('=') {
            return Err(malformed());
        }
        let target = target.trim();
        if target.is_empty() {
            return Err(InitializationError::EmptyTarget(directive.to_string()));
        }
        let level = LogLevel::parse_lenient(level).ok_or_else(|| InitializationError::UnknownLevel {
            directive: directive.to_string(),
            level: level.trim().to_string(),
        })?;

        Ok(LogDirective::new(target, level))
    }

    /// `EnvFilter` syntax.
    pub fn to_filter_string(&self) -> String {
        format!("{}={}", self.target, self.level.as_str())
    }
}
