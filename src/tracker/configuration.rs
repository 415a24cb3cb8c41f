//! Tracker configuration map and its typed views.

use std::collections::HashMap;

use thiserror::Error;
use tracing::warn;

use crate::builder::{Endpoint, MultihitPolicy};
use crate::domain::OfflineMode;

pub const LOG: &str = "log";
pub const LOG_SSL: &str = "logSSL";
pub const DOMAIN: &str = "domain";
pub const PIXEL_PATH: &str = "pixelPath";
pub const SITE: &str = "site";
pub const SECURE: &str = "secure";
pub const STORAGE: &str = "storage";
pub const IDENTIFIER: &str = "identifier";
pub const HASH_USER_ID: &str = "hashUserId";
pub const ENABLE_BACKGROUND_TASK: &str = "enableBackgroundTask";
pub const MAX_HIT_LENGTH: &str = "maxHitLength";
pub const MAX_MULTIHITS: &str = "maxMultihits";

/// Keys that cannot be changed once the tracker exists.
pub const READ_ONLY_CONFIGURATION: &[&str] = &["downloadSource"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Configuration {key} is read only. Value will not be updated")]
    ReadOnly { key: String },

    #[error("Missing configuration value: {0}")]
    Missing(&'static str),
}

/// String map keyed by configuration name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    values: HashMap<String, String>,
}

impl Default for Configuration {
    fn default() -> Self {
        let values = [
            (LOG, ""),
            (LOG_SSL, ""),
            (DOMAIN, ""),
            (PIXEL_PATH, "/hit.xiti"),
            (SITE, ""),
            (SECURE, "true"),
            (STORAGE, "required"),
            (IDENTIFIER, "uuid"),
            (HASH_USER_ID, "false"),
            (ENABLE_BACKGROUND_TASK, "true"),
            (MAX_HIT_LENGTH, "1600"),
            (MAX_MULTIHITS, "999"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { values }
    }
}

impl Configuration {
    /// Defaults overlaid with `values`.
    pub fn from_map(values: HashMap<String, String>) -> Self {
        let mut configuration = Self::default();
        configuration.values.extend(values);
        configuration
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    /// Writes one key. Read-only keys are refused.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigurationError> {
        if READ_ONLY_CONFIGURATION.contains(&key) {
            return Err(ConfigurationError::ReadOnly { key: key.to_string() });
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Replaces the whole map; read-only keys keep their current value.
    pub fn replace(&mut self, values: HashMap<String, String>) -> Vec<ConfigurationError> {
        let mut refused = Vec::new();
        let mut next: HashMap<String, String> = HashMap::new();
        for (key, value) in values {
            if READ_ONLY_CONFIGURATION.contains(&key.as_str()) {
                refused.push(ConfigurationError::ReadOnly { key });
            } else {
                next.insert(key, value);
            }
        }
        for key in READ_ONLY_CONFIGURATION {
            if let Some(value) = self.values.get(*key) {
                next.insert((*key).to_string(), value.clone());
            }
        }
        self.values = next;
        refused
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    fn number(&self, key: &str, default: usize) -> usize {
        match self.get(key).map(str::parse::<usize>) {
            Some(Ok(n)) if n > 0 => n,
            Some(_) => {
                warn!("Ignoring invalid {} value, using {}", key, default);
                default
            }
            None => default,
        }
    }

    /// Unknown values fall back to `Required`.
    pub fn offline_mode(&self) -> OfflineMode {
        self.get(STORAGE)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    pub fn hash_user_id(&self) -> bool {
        self.flag(HASH_USER_ID)
    }

    pub fn background_task_enabled(&self) -> bool {
        self.flag(ENABLE_BACKGROUND_TASK)
    }

    pub fn multihit_policy(&self) -> MultihitPolicy {
        let defaults = MultihitPolicy::default();
        MultihitPolicy {
            max_hit_length: self.number(MAX_HIT_LENGTH, defaults.max_hit_length),
            max_hits: self.number(MAX_MULTIHITS, defaults.max_hits),
            ..defaults
        }
    }

    /// Collection endpoint; a hit cannot be built without a domain and site.
    pub fn endpoint(&self) -> Result<Endpoint, ConfigurationError> {
        let required = |key: &'static str| match self.get(key) {
            Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
            _ => Err(ConfigurationError::Missing(key)),
        };
        let optional = |key: &str| self.get(key).unwrap_or_default().trim().to_string();

        Ok(Endpoint {
            secure: self.flag(SECURE),
            log: optional(LOG),
            log_ssl: optional(LOG_SSL),
            domain: required(DOMAIN)?,
            pixel_path: optional(PIXEL_PATH),
            site: required(SITE)?,
        })
    }
}
