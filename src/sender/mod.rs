//! Hit delivery: network transmission with retries, offline fallback and
//! draining of the offline queue.

pub mod client;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::ContextProvider;
use crate::domain::{Hit, HitStatus, OfflineMode};
use crate::reliability::{OfflineStorage, RetryConfig, RetryManager, StorageError};
use crate::tracker::delegate::Notifier;

pub use client::{ClientConfig, ClientError, ConnectionStats, HttpClient, validate_hit_url};

/// Final state of one hit handed to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Queued offline; counts as deferred success.
    Stored,
    /// Lost: best-effort send failed, or storing it failed.
    Failed,
    /// Unusable hit, reported as an error and dropped.
    Abandoned,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
    pub evicted: usize,
    pub remaining: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub client: ClientConfig,
    pub retry: RetryConfig,
    /// Upper bound for one storage call.
    pub storage_timeout: Duration,
    /// Stored hits older than this are evicted before each flush.
    pub retention: Option<Duration>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            retry: RetryConfig::default(),
            storage_timeout: Duration::from_secs(5),
            retention: None,
        }
    }
}

pub struct HitSender {
    client: HttpClient,
    storage: OfflineStorage,
    retry: Mutex<RetryManager>,
    notifier: Arc<Notifier>,
    context: Arc<dyn ContextProvider>,
    storage_timeout: Duration,
    retention: Option<Duration>,
}

impl HitSender {
    pub fn new(
        config: SenderConfig,
        storage: OfflineStorage,
        notifier: Arc<Notifier>,
        context: Arc<dyn ContextProvider>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            client: HttpClient::new(config.client)?,
            storage,
            retry: Mutex::new(RetryManager::new(config.retry)),
            notifier,
            context,
            storage_timeout: config.storage_timeout,
            retention: config.retention,
        })
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Delivers or stores one hit according to `mode`.
    ///
    /// In `Required` mode the stored backlog is drained first so delivery
    /// keeps occurrence order; `resend` scopes that drain.
    pub async fn send(&self, hit: &Hit, mode: OfflineMode, resend: &CancellationToken) -> SendOutcome {
        if let Err(e) = validate_hit_url(&hit.url) {
            self.notifier.error(&e.to_string());
            return SendOutcome::Abandoned;
        }

        match mode {
            OfflineMode::Always => return self.store(hit).await,
            OfflineMode::Required if !self.context.connection_type().is_online() => {
                return self.store(hit).await;
            }
            OfflineMode::Required => {
                self.flush_offline(resend).await;
            }
            OfflineMode::Never => {}
        }

        match self.transmit(&hit.url).await {
            Ok(()) => {
                self.notifier.send_did_end(HitStatus::Success, "OK");
                SendOutcome::Delivered
            }
            Err(e) if e.is_configuration() => {
                self.notifier.error(&e.to_string());
                SendOutcome::Abandoned
            }
            Err(e) if mode == OfflineMode::Never => {
                self.notifier.send_did_end(HitStatus::Failed, &e.to_string());
                SendOutcome::Failed
            }
            Err(e) => {
                warn!("Delivery failed, queueing hit offline: {}", e);
                self.store(hit).await
            }
        }
    }

    /// Sends with the configured retry policy.
    async fn transmit(&self, url: &str) -> Result<(), ClientError> {
        self.retry.lock().start_retry(url);

        let result = loop {
            match self.client.send_hit(url).await {
                Ok(elapsed) => {
                    debug!("Hit delivered in {:?}", elapsed);
                    break Ok(());
                }
                Err(e) if e.is_configuration() => break Err(e),
                Err(e) => {
                    let next = self.retry.lock().record_failure(url);
                    let Some(delay) = next else {
                        let spent = self.retry.lock().elapsed(url).unwrap_or_default();
                        debug!("Giving up on hit after {:?}: {}", spent, e);
                        break Err(e);
                    };
                    let attempt = self.retry.lock().get_attempt_count(url) + 1;
                    info!("Retrying hit in {:?} (attempt {}): {}", delay, attempt, e);
                    tokio::time::sleep(delay).await;
                }
            }
        };

        self.retry.lock().remove_retry(url);
        result
    }

    async fn store(&self, hit: &Hit) -> SendOutcome {
        let url = hit.url.clone();
        let olt = hit.olt();
        let created_at = hit.created_at;

        match self
            .with_storage(move |storage| storage.insert_at(&url, Some(&olt), created_at))
            .await
        {
            Ok(_) => {
                self.notifier.save_did_end(&hit.url);
                SendOutcome::Stored
            }
            Err(e) => {
                self.notifier.error(&format!("Could not store hit offline: {e}"));
                SendOutcome::Failed
            }
        }
    }

    /// Drains the offline queue oldest first.
    ///
    /// Delivered hits are deleted; the first failure bumps that hit's retry
    /// counter and stops the drain so order is preserved. Once `cancel`
    /// fires, no further resend starts.
    pub async fn flush_offline(&self, cancel: &CancellationToken) -> FlushReport {
        let mut report = FlushReport::default();

        let cutoff = self
            .retention
            .and_then(|retention| chrono::Duration::from_std(retention).ok())
            .and_then(|retention| Utc::now().checked_sub_signed(retention));
        if let Some(cutoff) = cutoff {
            match self.with_storage(move |s| s.delete_older_than(cutoff)).await {
                Ok(evicted) => report.evicted = evicted,
                Err(e) => self.notifier.error(&format!("Offline eviction failed: {e}")),
            }
        }

        let hits = match self.with_storage(|s| s.get()).await {
            Ok(hits) => hits,
            Err(e) => {
                self.notifier.error(&format!("Could not read offline hits: {e}"));
                return report;
            }
        };

        for hit in hits {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if !self.context.connection_type().is_online() {
                break;
            }

            match self.client.send_hit(&hit.url).await {
                Ok(_) => {
                    let url = hit.url.clone();
                    if let Err(e) = self.with_storage(move |s| s.delete(&url)).await {
                        self.notifier.error(&format!("Could not delete resent hit: {e}"));
                    }
                    report.delivered += 1;
                    self.notifier.send_did_end(HitStatus::Success, "OK");
                }
                Err(e) => {
                    let url = hit.url.clone();
                    if let Err(e) = self.with_storage(move |s| s.increment_retry(&url)).await {
                        self.notifier.error(&format!("Could not update offline hit: {e}"));
                    }
                    report.failed += 1;
                    self.notifier.send_did_end(HitStatus::Failed, &e.to_string());
                    break;
                }
            }
        }

        report.remaining = self.storage.count();
        if report.delivered > 0 || report.failed > 0 {
            info!(
                "Offline flush: {} delivered, {} failed, {} remaining",
                report.delivered, report.failed, report.remaining
            );
        }
        report
    }

    /// Runs a storage call off the async workers, bounded by the storage
    /// timeout. A timed out call still commits or rolls back on its own.
    async fn with_storage<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(&OfflineStorage) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let storage = self.storage.clone();
        let task = tokio::task::spawn_blocking(move || op(&storage));
        match tokio::time::timeout(self.storage_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(StorageError::Task(join.to_string())),
            Err(_) => Err(StorageError::Timeout),
        }
    }
}
