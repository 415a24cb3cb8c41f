//! Extra run time requested from the host while the application suspends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type Completion = Box<dyn FnOnce() + Send>;
pub type ExpirationHandler = Box<dyn FnOnce() + Send>;

/// Host side of a run-time extension (an OS background task, a service
/// keep-alive, ...).
pub trait BackgroundHost: Send + Sync {
    /// Starts an extension identified by `key`. The host calls `on_expire`
    /// when the granted time is about to run out.
    fn begin_extension(&self, key: u64, on_expire: ExpirationHandler);

    /// Releases the extension identified by `key`.
    fn end_extension(&self, key: u64);
}

/// Host without a notion of suspension. Extensions never expire.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHost;

impl BackgroundHost for NoopHost {
    fn begin_extension(&self, _key: u64, _on_expire: ExpirationHandler) {}

    fn end_extension(&self, _key: u64) {}
}

/// Tracks in-flight extension requests and the cancellation scope of offline
/// resends running under them.
pub struct BackgroundTaskGuard {
    counter: AtomicU64,
    tasks: Mutex<HashMap<u64, Option<Completion>>>,
    resend_scope: Mutex<CancellationToken>,
    host: Arc<dyn BackgroundHost>,
}

impl BackgroundTaskGuard {
    pub fn new(host: Arc<dyn BackgroundHost>) -> Arc<Self> {
        Arc::new(Self {
            counter: AtomicU64::new(0),
            tasks: Mutex::new(HashMap::new()),
            resend_scope: Mutex::new(CancellationToken::new()),
            host,
        })
    }

    /// Registers a new request and returns its key.
    pub fn begin(self: &Arc<Self>, completion: Option<Completion>) -> u64 {
        let key = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.tasks.lock().insert(key, completion);

        let guard: Weak<Self> = Arc::downgrade(self);
        self.host.begin_extension(
            key,
            Box::new(move || {
                if let Some(guard) = guard.upgrade() {
                    guard.expire(key);
                }
            }),
        );
        debug!("Background task {} started", key);
        key
    }

    /// Runs the completion of `key` and releases its extension. Unknown or
    /// already ended keys are ignored.
    pub fn end(&self, key: u64) {
        let Some(completion) = self.tasks.lock().remove(&key) else {
            return;
        };
        if let Some(completion) = completion {
            completion();
        }
        self.host.end_extension(key);
        debug!("Background task {} ended", key);
    }

    /// The host is about to revoke the extension: resends that have not
    /// reached the network yet are cancelled, then the task ends.
    pub fn expire(&self, key: u64) {
        if !self.tasks.lock().contains_key(&key) {
            return;
        }
        warn!("Background task {} expiring, cancelling pending offline resends", key);
        let scope = std::mem::replace(&mut *self.resend_scope.lock(), CancellationToken::new());
        scope.cancel();
        self.end(key);
    }

    /// Token observed by offline resends started now. It is cancelled when
    /// any extension expires; later resends get a fresh one.
    pub fn resend_token(&self) -> CancellationToken {
        self.resend_scope.lock().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.lock().len()
    }
}
