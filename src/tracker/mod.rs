//! Tracker composition root: owns the buffer, pending events, offline
//! store, serial queue and delegate, and exposes the public API.

pub mod configuration;
pub mod delegate;
pub mod identity;
pub mod offline;
pub mod queue;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::buffer::{Buffer, BufferWarning, ContextProvider, DefaultContext, context_variables};
use crate::dispatch::{DispatchReport, Dispatcher, PendingEvent, PendingEvents};
use crate::domain::{OfflineMode, ParamInput, ParamOption, TrackerError};
use crate::reliability::{
    BackgroundHost, BackgroundTaskGuard, NoopHost, OfflineStorage, Preferences, RetryConfig, StorageConfig,
};
use crate::sender::{ClientConfig, FlushReport, HitSender, SenderConfig};

pub use configuration::{Configuration, ConfigurationError};
pub use delegate::{ChannelDelegate, DelegateEvent, NoopDelegate, Notifier, TrackerDelegate};
pub use identity::UserIdentity;
pub use offline::Offline;
pub use queue::{JobHandle, QueueError, TrackerQueue};

const FIRST_LAUNCH_KEY: &str = "firstLaunchDone";
const FIRST_LAUNCH_MESSAGE: &str = "Tracker first launch";

struct TrackerInner {
    configuration: Arc<RwLock<Configuration>>,
    buffer: Mutex<Buffer>,
    pending: Mutex<PendingEvents>,
    dispatcher: Dispatcher,
    storage: OfflineStorage,
    queue: TrackerQueue,
    background: Arc<BackgroundTaskGuard>,
    notifier: Arc<Notifier>,
    context: Arc<dyn ContextProvider>,
    identity: UserIdentity,
    do_not_track: Arc<AtomicBool>,
    first_launch: AtomicBool,
}

/// Handle to one tracker. Cloning shares the same tracker.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

impl Tracker {
    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::default()
    }

    /// Sets a volatile parameter for the next hit.
    pub fn set_param(&self, key: &str, value: impl Into<ParamInput>) -> &Self {
        self.set_param_with(key, value, ParamOption::default())
    }

    /// Sets a parameter; refused or unserializable values become warnings
    /// and leave the buffer untouched.
    pub fn set_param_with(&self, key: &str, value: impl Into<ParamInput>, options: ParamOption) -> &Self {
        let outcome = value.into().into_param(key, options).map_err(BufferWarning::from).and_then(|param| {
            self.inner.buffer.lock().set(param)
        });
        if let Err(warning) = outcome {
            self.inner.notifier.warning(&warning.to_string());
        }
        self
    }

    pub fn unset_param(&self, key: &str) -> &Self {
        self.inner.buffer.lock().unset(key);
        self
    }

    /// Copy of the current buffer.
    pub fn buffer(&self) -> Buffer {
        self.inner.buffer.lock().clone()
    }

    /// Queues an event for the next dispatch and returns its id.
    pub fn add_event<E: PendingEvent + 'static>(&self, event: E) -> Uuid {
        let id = event.id();
        self.inner.pending.lock().insert(Arc::new(event));
        id
    }

    pub fn pending_events(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Builds and sends hits for every pending event, or for the buffer
    /// alone when nothing is pending. Runs on the serial queue.
    pub async fn dispatch(&self) -> Result<DispatchReport, TrackerError> {
        let inner = self.inner.clone();
        let handle = self
            .inner
            .queue
            .submit("dispatch", async move {
                let configuration = inner.configuration.read().clone();
                let resend = inner.background.resend_token();
                inner
                    .dispatcher
                    .dispatch(&inner.buffer, &inner.pending, &configuration, &resend)
                    .await
            })
            .map_err(|e| TrackerError::Queue(e.to_string()))?;
        handle.wait().await.map_err(|e| TrackerError::Queue(e.to_string()))
    }

    /// Snapshot of the configuration.
    pub fn configuration(&self) -> Configuration {
        self.inner.configuration.read().clone()
    }

    /// Writes one configuration key on the serial queue. Resolves to
    /// `false` when the key is read only.
    pub fn set_config(&self, key: &str, value: &str) -> JobHandle<bool> {
        let inner = self.inner.clone();
        let (key, value) = (key.to_string(), value.to_string());
        self.submit_or_report("set config", async move {
            match inner.configuration.write().set(&key, &value) {
                Ok(()) => {
                    debug!("Configuration {} updated", key);
                    true
                }
                Err(e) => {
                    inner.notifier.warning(&e.to_string());
                    false
                }
            }
        })
    }

    /// Merges `values` into the configuration, or replaces it entirely when
    /// `override_existing` is set.
    pub fn set_configuration(&self, values: HashMap<String, String>, override_existing: bool) -> JobHandle<bool> {
        let inner = self.inner.clone();
        self.submit_or_report("set configuration", async move {
            let refused = {
                let mut configuration = inner.configuration.write();
                if override_existing {
                    configuration.replace(values)
                } else {
                    values
                        .iter()
                        .filter_map(|(key, value)| configuration.set(key, value).err())
                        .collect()
                }
            };
            for e in &refused {
                inner.notifier.warning(&e.to_string());
            }
            refused.is_empty()
        })
    }

    pub fn set_do_not_track(&self, enabled: bool) -> JobHandle<bool> {
        let inner = self.inner.clone();
        self.submit_or_report("set do not track", async move {
            inner.do_not_track.store(enabled, Ordering::SeqCst);
            info!("Do not track {}", if enabled { "enabled" } else { "disabled" });
            true
        })
    }

    pub fn do_not_track(&self) -> bool {
        self.inner.do_not_track.load(Ordering::SeqCst)
    }

    fn submit_or_report<F>(&self, label: &'static str, task: F) -> JobHandle<bool>
    where
        F: Future<Output = bool> + Send + 'static,
    {
        match self.inner.queue.submit(label, task) {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.notifier.error(&format!("Could not run {label}: {e}"));
                JobHandle::ready(false)
            }
        }
    }

    /// Replaces the delegate. On the very first launch the new delegate is
    /// asked for approval once.
    pub fn set_delegate(&self, delegate: Arc<dyn TrackerDelegate>) {
        self.inner.notifier.set_delegate(delegate);
        if self.inner.first_launch.swap(false, Ordering::SeqCst) {
            self.inner.notifier.first_launch_approval(FIRST_LAUNCH_MESSAGE);
        }
    }

    pub fn user_id(&self) -> String {
        self.inner.identity.user_id()
    }

    pub fn context(&self) -> &Arc<dyn ContextProvider> {
        &self.inner.context
    }

    pub fn offline(&self) -> Offline<'_> {
        Offline::new(self)
    }

    /// Resends stored hits. In `Always` mode the queue is only drained when
    /// `force` is set.
    pub async fn flush_offline(&self, force: bool) -> FlushReport {
        let mode = self.inner.configuration.read().offline_mode();
        if mode == OfflineMode::Always && !force {
            debug!("Offline mode is always, skipping automatic flush");
            return FlushReport {
                remaining: self.inner.storage.count(),
                ..FlushReport::default()
            };
        }
        let resend = self.inner.background.resend_token();
        self.inner.dispatcher.sender().flush_offline(&resend).await
    }

    /// Asks the host for extra run time and drains the offline queue under
    /// it. Resends not started when the time runs out are cancelled.
    pub fn application_did_enter_background(&self) -> JoinHandle<FlushReport> {
        let key = if self.inner.configuration.read().background_task_enabled() {
            Some(self.inner.background.begin(None))
        } else {
            None
        };
        let tracker = self.clone();
        tokio::spawn(async move {
            let report = tracker.flush_offline(false).await;
            if let Some(key) = key {
                tracker.inner.background.end(key);
            }
            report
        })
    }

    pub fn application_did_become_active(&self) -> JoinHandle<FlushReport> {
        let tracker = self.clone();
        tokio::spawn(async move { tracker.flush_offline(false).await })
    }

    pub fn background_tasks(&self) -> usize {
        self.inner.background.in_flight()
    }

    /// Waits for every queued configuration write or dispatch to finish.
    pub async fn wait_idle(&self) -> Result<(), TrackerError> {
        self.inner
            .queue
            .wait_idle()
            .await
            .map_err(|e| TrackerError::Queue(e.to_string()))
    }
}

/// Assembles a [`Tracker`].
pub struct TrackerBuilder {
    configuration: HashMap<String, String>,
    storage: Option<StorageConfig>,
    context: Option<Arc<dyn ContextProvider>>,
    host: Arc<dyn BackgroundHost>,
    delegate: Option<Arc<dyn TrackerDelegate>>,
    sender: SenderConfig,
}

impl Default for TrackerBuilder {
    fn default() -> Self {
        Self {
            configuration: HashMap::new(),
            storage: None,
            context: None,
            host: Arc::new(NoopHost),
            delegate: None,
            sender: SenderConfig::default(),
        }
    }
}

impl TrackerBuilder {
    pub fn configuration(mut self, values: HashMap<String, String>) -> Self {
        self.configuration.extend(values);
        self
    }

    pub fn config(mut self, key: &str, value: &str) -> Self {
        self.configuration.insert(key.to_string(), value.to_string());
        self
    }

    /// On-disk offline store. Without one, a temporary store is used.
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn context(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn background_host(mut self, host: Arc<dyn BackgroundHost>) -> Self {
        self.host = host;
        self
    }

    pub fn delegate(mut self, delegate: Arc<dyn TrackerDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.sender.retry = retry;
        self
    }

    pub fn client(mut self, client: ClientConfig) -> Self {
        self.sender.client = client;
        self
    }

    pub fn retention(mut self, retention: Duration) -> Self {
        self.sender.retention = Some(retention);
        self
    }

    pub fn storage_timeout(mut self, timeout: Duration) -> Self {
        self.sender.storage_timeout = timeout;
        self
    }

    /// Opens the offline store and starts the serial worker; must run inside
    /// a tokio runtime.
    pub async fn build(self) -> Result<Tracker, TrackerError> {
        let storage_config = self.storage;
        let storage = tokio::task::spawn_blocking(move || match storage_config {
            Some(config) => OfflineStorage::open(&config),
            None => OfflineStorage::temporary(),
        })
        .await
        .map_err(|e| TrackerError::Config(format!("Storage initialization failed: {e}")))??;

        let preferences = storage.preferences()?;
        let first_launch = is_first_launch(&preferences)?;

        let configuration = Arc::new(RwLock::new(Configuration::from_map(self.configuration)));
        let context = self
            .context
            .unwrap_or_else(|| Arc::new(DefaultContext::default()) as Arc<dyn ContextProvider>);
        let notifier = Arc::new(Notifier::default());
        let do_not_track = Arc::new(AtomicBool::new(false));
        let identity = UserIdentity::new(preferences, configuration.clone(), do_not_track.clone());

        let seed_identity = identity.clone();
        let buffer = Buffer::seeded(context_variables(context.clone(), move || seed_identity.user_id()));

        let sender = HitSender::new(self.sender, storage.clone(), notifier.clone(), context.clone())
            .map_err(|e| TrackerError::Transmission(e.to_string()))?;
        let dispatcher = Dispatcher::new(Arc::new(sender), notifier.clone());

        let stored = storage.count();
        if stored > 0 {
            info!("Tracker started with {} hits waiting offline", stored);
        }
        if configuration.read().endpoint().is_err() {
            warn!("Tracker has no usable endpoint yet; hits cannot be built until domain and site are set");
        }

        let tracker = Tracker {
            inner: Arc::new(TrackerInner {
                configuration,
                buffer: Mutex::new(buffer),
                pending: Mutex::new(PendingEvents::new()),
                dispatcher,
                storage,
                queue: TrackerQueue::new(),
                background: BackgroundTaskGuard::new(self.host),
                notifier,
                context,
                identity,
                do_not_track,
                first_launch: AtomicBool::new(first_launch),
            }),
        };

        if let Some(delegate) = self.delegate {
            tracker.set_delegate(delegate);
        }
        Ok(tracker)
    }
}

/// True exactly once per store: the marker is written on the first call.
fn is_first_launch(preferences: &Preferences) -> Result<bool, TrackerError> {
    if preferences.get(FIRST_LAUNCH_KEY)?.is_some() {
        return Ok(false);
    }
    preferences.set(FIRST_LAUNCH_KEY, "1")?;
    Ok(true)
}
