//! Delivery reliability: the durable offline queue, retry policy and
//! background execution guard.

pub mod background;
pub mod retry;
pub mod storage;

pub use background::{BackgroundHost, BackgroundTaskGuard, Completion, ExpirationHandler, NoopHost};
pub use retry::{RetryConfig, RetryManager, RetryStrategy};
pub use storage::{
    InsertOutcome, OfflineStorage, Preferences, StorageConfig, StorageError, StoredHit, offline_hit_string,
};
