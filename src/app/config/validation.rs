use super::{Config, ConfigError};
use crate::builder::Endpoint;
use url::Url;

const MIN_HIT_LENGTH: usize = 200;

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let domain = self.domain.trim();
        if domain.is_empty() {
            return Err(ConfigError::invalid("domain", "must be set"));
        }
        if domain.contains("://") || domain.contains('/') {
            return Err(ConfigError::invalid(
                "domain",
                format!("'{domain}' must be a bare host, without scheme or path"),
            ));
        }
        if self.site.trim().is_empty() {
            return Err(ConfigError::invalid("site", "must be set"));
        }

        let base = Endpoint {
            secure: self.secure,
            log: self.log.clone(),
            log_ssl: self.log_ssl.clone(),
            domain: domain.to_string(),
            pixel_path: self.pixel_path.clone(),
            site: self.site.trim().to_string(),
        }
        .base_url();
        Url::parse(&base).map_err(|e| ConfigError::InvalidUrl(format!("'{base}': {e}")))?;

        if self.max_hit_length < MIN_HIT_LENGTH {
            return Err(ConfigError::invalid(
                "max_hit_length",
                format!("{} is below the minimum of {MIN_HIT_LENGTH}", self.max_hit_length),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("request_timeout", "must be greater than 0"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "at least one attempt is needed"));
        }

        Ok(())
    }
}
