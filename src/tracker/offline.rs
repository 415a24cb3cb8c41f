use chrono::{DateTime, Duration, Utc};

use super::Tracker;
use crate::domain::Hit;
use crate::reliability::StorageError;
use crate::sender::FlushReport;

/// Offline queue operations exposed to the embedding application.
///
/// Counts are `-1` when the store fails, which is distinct from an empty
/// queue; the failure itself goes to the delegate.
pub struct Offline<'a> {
    tracker: &'a Tracker,
}

impl<'a> Offline<'a> {
    pub(super) fn new(tracker: &'a Tracker) -> Self {
        Self { tracker }
    }

    fn report<T>(&self, result: Result<T, StorageError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.tracker.inner.notifier.error(&format!("Offline storage error: {e}"));
                None
            }
        }
    }

    fn counted(&self, result: Result<usize, StorageError>) -> i64 {
        self.report(result).map_or(-1, |n| n as i64)
    }

    /// Resends every stored hit, whatever the offline mode.
    pub async fn dispatch(&self) -> FlushReport {
        self.tracker.flush_offline(true).await
    }

    /// Stored hits, oldest first.
    pub fn get(&self) -> Vec<Hit> {
        self.report(self.tracker.inner.storage.get()).unwrap_or_default()
    }

    pub fn count(&self) -> i64 {
        self.tracker.inner.storage.count() as i64
    }

    pub fn delete(&self) -> i64 {
        self.counted(self.tracker.inner.storage.delete_all())
    }

    pub fn delete_older_than_days(&self, days: i64) -> i64 {
        let cutoff = Duration::try_days(days).and_then(|age| Utc::now().checked_sub_signed(age));
        match cutoff {
            Some(date) => self.delete_older_than(date),
            None => {
                self.tracker
                    .inner
                    .notifier
                    .error(&format!("Offline storage error: {days} days is out of range"));
                -1
            }
        }
    }

    pub fn delete_older_than(&self, date: DateTime<Utc>) -> i64 {
        self.counted(self.tracker.inner.storage.delete_older_than(date))
    }

    pub fn oldest(&self) -> Option<Hit> {
        self.report(self.tracker.inner.storage.first()).flatten()
    }

    pub fn latest(&self) -> Option<Hit> {
        self.report(self.tracker.inner.storage.last()).flatten()
    }
}
