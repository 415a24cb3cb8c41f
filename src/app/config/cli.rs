use super::{ConfigError, LogFormat, LogLevel};
use crate::domain::OfflineMode;
use crate::reliability::{RetryConfig, StorageConfig};
use crate::sender::ClientConfig;
use crate::tracker::configuration as keys;
use clap::{ArgAction, Args};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collection domain, without scheme or path
    #[arg(long, env = "HIT_TRACKER_DOMAIN", default_value = "")]
    pub domain: String,

    /// Site identifier sent as `s`
    #[arg(long, env = "HIT_TRACKER_SITE", default_value = "")]
    pub site: String,

    /// Subdomain used over http
    #[arg(long, env = "HIT_TRACKER_LOG", default_value = "")]
    pub log: String,

    /// Subdomain used over https
    #[arg(long, env = "HIT_TRACKER_LOG_SSL", default_value = "")]
    pub log_ssl: String,

    #[arg(long, env = "HIT_TRACKER_PIXEL_PATH", default_value = "/hit.xiti")]
    pub pixel_path: String,

    /// Send over https
    #[arg(long, env = "HIT_TRACKER_SECURE", default_value_t = true, action = ArgAction::Set)]
    pub secure: bool,

    /// Offline policy: always, never or required
    #[arg(long, env = "HIT_TRACKER_OFFLINE_MODE", default_value = "required")]
    pub offline_mode: OfflineMode,

    /// Offline store location
    #[arg(long, env = "HIT_TRACKER_STORAGE_PATH", default_value = "/tmp/hit-tracker/offline")]
    pub storage_path: PathBuf,

    /// Send the SHA-256 of the visitor id instead of the id
    #[arg(long, env = "HIT_TRACKER_HASH_USER_ID")]
    pub hash_user_id: bool,

    /// Split threshold for one hit URL
    #[arg(long, env = "HIT_TRACKER_MAX_HIT_LENGTH", default_value = "1600")]
    pub max_hit_length: usize,

    /// Network attempts per hit before it is stored offline
    #[arg(long, env = "HIT_TRACKER_MAX_ATTEMPTS", default_value = "3")]
    pub max_attempts: u32,

    /// Request timeout in milliseconds
    #[arg(
        long,
        env = "HIT_TRACKER_REQUEST_TIMEOUT_MS",
        default_value = "10000",
        value_parser = super::serde_helpers::parse_millis
    )]
    #[serde(with = "super::serde_helpers")]
    pub request_timeout: Duration,

    /// Evict stored hits older than this many days before each flush
    #[arg(long, env = "HIT_TRACKER_RETENTION_DAYS")]
    pub retention_days: Option<u64>,

    #[arg(long, env = "HIT_TRACKER_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    #[arg(long, env = "HIT_TRACKER_LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// TOML file replacing the command line settings
    #[arg(long, env = "HIT_TRACKER_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domain: String::new(),
            site: String::new(),
            log: String::new(),
            log_ssl: String::new(),
            pixel_path: "/hit.xiti".to_string(),
            secure: true,
            offline_mode: OfflineMode::Required,
            storage_path: PathBuf::from("/tmp/hit-tracker/offline"),
            hash_user_id: false,
            max_hit_length: 1600,
            max_attempts: 3,
            request_timeout: Duration::from_secs(10),
            retention_days: None,
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
            config_file: None,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// The file named by `config_file` when set, otherwise `self`.
    pub fn resolve(self) -> Result<Self, ConfigError> {
        match &self.config_file {
            Some(path) => Self::from_file(path),
            None => {
                self.validate()?;
                Ok(self)
            }
        }
    }

    /// Tracker configuration map.
    pub fn to_configuration(&self) -> HashMap<String, String> {
        [
            (keys::DOMAIN, self.domain.clone()),
            (keys::SITE, self.site.clone()),
            (keys::LOG, self.log.clone()),
            (keys::LOG_SSL, self.log_ssl.clone()),
            (keys::PIXEL_PATH, self.pixel_path.clone()),
            (keys::SECURE, self.secure.to_string()),
            (keys::STORAGE, self.offline_mode.to_string()),
            (keys::HASH_USER_ID, self.hash_user_id.to_string()),
            (keys::MAX_HIT_LENGTH, self.max_hit_length.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            path: self.storage_path.clone(),
            temporary: false,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            ..RetryConfig::default()
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: self.request_timeout,
            ..ClientConfig::default()
        }
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention_days
            .map(|days| Duration::from_secs(days.saturating_mul(24 * 60 * 60)))
    }
}
