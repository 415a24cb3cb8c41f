use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use super::config::{LogFormat, LogLevel};
use super::initialization::{InitializationError, LogDirective, Recovery};

/// Transport and storage crates are noisy at debug level.
const QUIET_TARGETS: [&str; 5] = ["hyper", "h2", "reqwest", "rustls", "sled"];

/// Collects filter directives, then installs the global subscriber.
pub struct LoggingSystem {
    directives: Mutex<Vec<LogDirective>>,
    fallback: LogLevel,
}

impl LoggingSystem {
    pub fn new() -> Self {
        Self::with_fallback(LogLevel::Info)
    }

    /// `fallback` replaces levels that fail to parse.
    pub fn with_fallback(fallback: LogLevel) -> Self {
        Self {
            directives: Mutex::new(Vec::new()),
            fallback,
        }
    }

    /// Adds a `target=level` directive. A bad level keeps the target at the
    /// fallback level; a malformed directive is dropped.
    pub fn add_directive(&self, input: &str) -> Result<(), InitializationError> {
        let directive = match LogDirective::parse(input) {
            Ok(directive) => directive,
            Err(e) => match e.recovery() {
                Recovery::FallbackLevel => {
                    eprintln!("Warning: {e}, using {}", self.fallback.as_str());
                    let target = input.split('=').next().unwrap_or_default().trim();
                    LogDirective::new(target, self.fallback)
                }
                Recovery::Skip => {
                    eprintln!("Warning: {e}, ignored");
                    return Ok(());
                }
                Recovery::Fail => return Err(e),
            },
        };
        self.directives.lock().push(directive);
        Ok(())
    }

    pub fn add_default_directives(&self) {
        self.directives
            .lock()
            .extend(QUIET_TARGETS.iter().map(|target| LogDirective::new(*target, LogLevel::Warn)));
    }

    /// `EnvFilter` string: the default level, then every directive in order.
    pub fn build_filter_string(&self, default_level: LogLevel) -> String {
        let directives = self.directives.lock();
        let mut filter = default_level.as_str().to_string();
        for directive in &*directives {
            filter.push(',');
            filter.push_str(&directive.to_filter_string());
        }
        filter
    }

    pub fn directive_count(&self) -> usize {
        self.directives.lock().len()
    }

    pub fn initialize_tracing(&self, default_level: LogLevel, format: LogFormat) -> Result<(), InitializationError> {
        let filter = self.build_filter_string(default_level);
        let env_filter = EnvFilter::try_new(&filter).map_err(|e| InitializationError::Subscriber {
            details: format!("filter '{filter}' rejected"),
            source: Box::new(e),
        })?;

        let registry = tracing_subscriber::registry().with(env_filter);
        let installed = match format {
            LogFormat::Compact => registry
                .with(fmt::layer().compact().with_target(true).with_thread_ids(true))
                .try_init(),
            LogFormat::Json => registry
                .with(fmt::layer().json().with_current_span(false))
                .try_init(),
        };

        installed.map_err(|e| InitializationError::Subscriber {
            details: "a global subscriber is already set".to_string(),
            source: Box::new(e),
        })
    }
}

impl Default for LoggingSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the subscriber on the first call. Later calls only report how
/// the first one went.
pub fn setup_logging_safe(level: LogLevel, format: LogFormat) -> Result<(), InitializationError> {
    static INSTALLED: OnceLock<bool> = OnceLock::new();

    let installed = *INSTALLED.get_or_init(|| {
        let logging = LoggingSystem::new();
        logging.add_default_directives();
        logging.initialize_tracing(level, format).is_ok()
    });

    if installed {
        Ok(())
    } else {
        Err(InitializationError::Subscriber {
            details: "logging was not initialized".to_string(),
            source: Box::new(std::io::Error::other("subscriber setup failed")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_follow_the_level() {
        let logging = LoggingSystem::new();
        assert_eq!(logging.build_filter_string(LogLevel::Info), "info");

        logging.add_default_directives();
        let filter = logging.build_filter_string(LogLevel::Debug);
        assert!(filter.starts_with("debug,hyper=warn"));
        assert!(filter.ends_with("sled=warn"));
        assert_eq!(logging.directive_count(), QUIET_TARGETS.len());
    }

    #[test]
    fn test_unusable_directives_are_recovered() {
        let logging = LoggingSystem::with_fallback(LogLevel::Error);
        let steps = [
            ("hit_tracker=debug", 1),
            ("not a directive", 1),
            ("sled=loud", 2),
            ("=warn", 2),
        ];
        for (input, expected) in steps {
            assert!(logging.add_directive(input).is_ok());
            assert_eq!(logging.directive_count(), expected, "after {input:?}");
        }
        assert_eq!(
            logging.build_filter_string(LogLevel::Warn),
            "warn,hit_tracker=debug,sled=error"
        );
    }

    #[test]
    fn test_setup_logging_safe_is_idempotent() {
        let first = setup_logging_safe(LogLevel::Info, LogFormat::Compact);
        let second = setup_logging_safe(LogLevel::Debug, LogFormat::Json);
        assert_eq!(first.is_ok(), second.is_ok());
    }
}
