use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use reqwest::{Client, ClientBuilder};
use thiserror::Error;
use tokio::time::timeout;
use url::Url;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Request timeout after {0:?}")]
    RequestTimeout(Duration),
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl ClientError {
    /// Errors no amount of retrying will fix.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ClientError::InvalidConfiguration(_))
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound for one hit request, connection included.
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub max_connections: usize,
    pub keep_alive_timeout: Duration,
    pub user_agent: String,
    pub enable_compression: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(5),
            max_connections: 4,
            keep_alive_timeout: Duration::from_secs(60),
            user_agent: format!("hit-tracker/{}", env!("CARGO_PKG_VERSION")),
            enable_compression: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub active_connections: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time: Duration,
}

#[derive(Debug, Default)]
pub struct ClientStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    active_connections: AtomicUsize,
    total_response_time: AtomicU64,
}

impl ClientStats {
    pub fn record_request(&self, success: bool, response_time: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);

        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Thin GET client for the collection endpoint.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: ClientConfig,
    stats: Arc<ClientStats>,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .pool_max_idle_per_host(config.max_connections)
            .pool_idle_timeout(config.keep_alive_timeout)
            .user_agent(&config.user_agent)
            .gzip(config.enable_compression)
            .build()
            .map_err(|e| ClientError::InvalidConfiguration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            stats: Arc::new(ClientStats::default()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends one hit. Any 2xx counts as delivered.
    pub async fn send_hit(&self, hit_url: &str) -> Result<Duration, ClientError> {
        let url = validate_hit_url(hit_url)?;

        self.stats.active_connections.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let result = timeout(self.config.timeout, self.client.get(url).send()).await;
        self.stats.active_connections.fetch_sub(1, Ordering::Relaxed);
        let elapsed = start.elapsed();

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.stats.record_request(false, elapsed);
                return Err(if e.is_connect() {
                    ClientError::ConnectionFailed(e.to_string())
                } else {
                    ClientError::NetworkError(e)
                });
            }
            Err(_) => {
                self.stats.record_request(false, elapsed);
                return Err(ClientError::RequestTimeout(self.config.timeout));
            }
        };

        let status = response.status();
        self.stats.record_request(status.is_success(), elapsed);

        if status.is_success() {
            Ok(elapsed)
        } else {
            Err(ClientError::HttpError {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            })
        }
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        let total_requests = self.stats.total_requests.load(Ordering::Relaxed);
        let total_response_time = self.stats.total_response_time.load(Ordering::Relaxed);

        let average_response_time = if total_requests > 0 {
            Duration::from_millis(total_response_time / total_requests)
        } else {
            Duration::ZERO
        };

        ConnectionStats {
            active_connections: self.stats.active_connections.load(Ordering::Relaxed),
            total_requests,
            successful_requests: self.stats.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.stats.failed_requests.load(Ordering::Relaxed),
            average_response_time,
        }
    }
}

/// A hit is only worth sending (or storing) if it parses as an http(s) URL
/// with a host.
pub fn validate_hit_url(hit_url: &str) -> Result<Url, ClientError> {
    let url = Url::parse(hit_url)
        .map_err(|e| ClientError::InvalidConfiguration(format!("Invalid hit URL {hit_url}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::InvalidConfiguration(format!(
            "Unsupported scheme in hit URL: {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ClientError::InvalidConfiguration(format!(
            "Hit URL has no host: {hit_url}"
        )));
    }
    Ok(url)
}
