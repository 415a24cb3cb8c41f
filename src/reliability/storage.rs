//! Durable offline queue backed by `sled`.
//!
//! Two trees hold the queue: `offline_hits` maps the stored hit string to its
//! record, `offline_hits_by_date` maps `(creation micros, id)` to the hit
//! string so reads come back ordered by creation date. Every mutation touches
//! both trees inside one transaction and is flushed before returning.

use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use sled::{Db, IVec, Transactional, Tree};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{Hit, format_timestamp};

const HITS_TREE: &str = "offline_hits";
const BY_DATE_TREE: &str = "offline_hits_by_date";
const PREFERENCES_TREE: &str = "preferences";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Transaction failed: {0}")]
    Transaction(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::error::EncodeError),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] bincode::error::DecodeError),
    #[error("Corrupted entry: {0}")]
    Corrupted(String),
    #[error("Storage operation timed out")]
    Timeout,
    #[error("Storage task failed: {0}")]
    Task(String),
}

fn transaction_error(error: TransactionError<()>) -> StorageError {
    StorageError::Transaction(format!("{error:?}"))
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
    /// Throwaway database removed on drop.
    pub temporary: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/hit-tracker/offline"),
            temporary: false,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct HitRecord {
    created_at_micros: i64,
    retry: u32,
    order_key: Vec<u8>,
}

/// Durable form of a queued hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHit {
    pub hit_string: String,
    pub creation_date: DateTime<Utc>,
    pub retry: u32,
}

impl From<StoredHit> for Hit {
    fn from(stored: StoredHit) -> Self {
        Hit {
            url: stored.hit_string,
            created_at: stored.creation_date,
            retry_count: stored.retry,
            is_offline: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyStored,
}

#[derive(Clone)]
pub struct OfflineStorage {
    db: Db,
    hits: Tree,
    by_date: Tree,
}

impl OfflineStorage {
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .path(&config.path)
            .temporary(config.temporary)
            .open()?;
        let storage = Self {
            hits: db.open_tree(HITS_TREE)?,
            by_date: db.open_tree(BY_DATE_TREE)?,
            db,
        };
        debug!("Opened offline storage at {:?} ({} hits)", config.path, storage.hits.len());
        Ok(storage)
    }

    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            hits: db.open_tree(HITS_TREE)?,
            by_date: db.open_tree(BY_DATE_TREE)?,
            db,
        })
    }

    pub fn preferences(&self) -> Result<Preferences, StorageError> {
        Ok(Preferences {
            db: self.db.clone(),
            tree: self.db.open_tree(PREFERENCES_TREE)?,
        })
    }

    /// Queues `hit`, stamped with `olt` (now when absent).
    pub fn insert(&self, hit: &str, olt: Option<&str>) -> Result<InsertOutcome, StorageError> {
        self.insert_at(hit, olt, Utc::now())
    }

    /// Queues `hit` with an explicit creation date.
    ///
    /// The stored string carries `cn=offline` and an `olt`; inserting a hit
    /// whose stored form already exists succeeds without changing anything.
    pub fn insert_at(
        &self,
        hit: &str,
        olt: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<InsertOutcome, StorageError> {
        let olt = olt.map_or_else(|| format_timestamp(created_at), str::to_string);
        let stored = offline_hit_string(hit, &olt);

        let order_key = order_key(created_at, self.db.generate_id()?);
        let record = HitRecord {
            created_at_micros: created_at.timestamp_micros(),
            retry: 0,
            order_key: order_key.clone(),
        };
        let record = bincode::serde::encode_to_vec(&record, bincode::config::standard())?;

        let inserted = (&self.hits, &self.by_date)
            .transaction(|(hits, by_date)| -> ConflictableTransactionResult<bool, ()> {
                if hits.get(stored.as_bytes())?.is_some() {
                    return Ok(false);
                }
                hits.insert(stored.as_bytes(), record.as_slice())?;
                by_date.insert(order_key.as_slice(), stored.as_bytes())?;
                Ok(true)
            })
            .map_err(transaction_error)?;
        self.db.flush()?;

        if inserted {
            debug!("Stored offline hit ({} queued)", self.hits.len());
            Ok(InsertOutcome::Inserted)
        } else {
            debug!("Offline hit already stored, skipping");
            Ok(InsertOutcome::AlreadyStored)
        }
    }

    /// Every queued hit, oldest first.
    pub fn get(&self) -> Result<Vec<Hit>, StorageError> {
        self.by_date
            .iter()
            .values()
            .map(|hit_string| {
                let hit_string = hit_string?;
                self.load(&hit_string)?
                    .map(Hit::from)
                    .ok_or_else(|| StorageError::Corrupted(lossy(&hit_string)))
            })
            .collect()
    }

    pub fn get_hit(&self, hit: &str) -> Result<Option<Hit>, StorageError> {
        Ok(self.load(hit.as_bytes())?.map(Hit::from))
    }

    pub fn count(&self) -> usize {
        self.hits.len()
    }

    pub fn exists(&self, hit: &str) -> Result<bool, StorageError> {
        Ok(self.hits.contains_key(hit.as_bytes())?)
    }

    /// Oldest hit by creation date.
    pub fn first(&self) -> Result<Option<Hit>, StorageError> {
        match self.by_date.first()? {
            Some((_, hit_string)) => Ok(self.load(&hit_string)?.map(Hit::from)),
            None => Ok(None),
        }
    }

    /// Newest hit by creation date.
    pub fn last(&self) -> Result<Option<Hit>, StorageError> {
        match self.by_date.last()? {
            Some((_, hit_string)) => Ok(self.load(&hit_string)?.map(Hit::from)),
            None => Ok(None),
        }
    }

    pub fn delete_all(&self) -> Result<usize, StorageError> {
        let entries = self
            .by_date
            .iter()
            .collect::<Result<Vec<(IVec, IVec)>, sled::Error>>()?;
        self.remove_entries(&entries)
    }

    /// Removes hits created strictly before `cutoff`.
    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let bound = micros_key(cutoff);
        let entries = self
            .by_date
            .range(..bound.as_slice())
            .collect::<Result<Vec<(IVec, IVec)>, sled::Error>>()?;
        let removed = self.remove_entries(&entries)?;
        if removed > 0 {
            info!("Evicted {} offline hits older than {}", removed, cutoff);
        }
        Ok(removed)
    }

    pub fn delete(&self, hit: &str) -> Result<bool, StorageError> {
        let Some(raw) = self.hits.get(hit.as_bytes())? else {
            return Ok(false);
        };
        let record = decode_record(&raw)?;
        let entry = (IVec::from(record.order_key), IVec::from(hit.as_bytes()));
        Ok(self.remove_entries(&[entry])? == 1)
    }

    /// Bumps the retry counter of a stored hit, returning the new value.
    pub fn increment_retry(&self, hit: &str) -> Result<Option<u32>, StorageError> {
        let Some(raw) = self.hits.get(hit.as_bytes())? else {
            return Ok(None);
        };
        let mut record = decode_record(&raw)?;
        record.retry += 1;
        let retry = record.retry;
        let encoded = bincode::serde::encode_to_vec(&record, bincode::config::standard())?;

        self.hits
            .transaction(|hits| -> ConflictableTransactionResult<(), ()> {
                if hits.get(hit.as_bytes())?.is_none() {
                    return Err(ConflictableTransactionError::Abort(()));
                }
                hits.insert(hit.as_bytes(), encoded.as_slice())?;
                Ok(())
            })
            .map_err(transaction_error)?;
        self.db.flush()?;
        Ok(Some(retry))
    }

    fn remove_entries(&self, entries: &[(IVec, IVec)]) -> Result<usize, StorageError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let removed = (&self.hits, &self.by_date)
            .transaction(|(hits, by_date)| -> ConflictableTransactionResult<usize, ()> {
                let mut removed = 0;
                for (order_key, hit_string) in entries {
                    by_date.remove(order_key.clone())?;
                    if hits.remove(hit_string.clone())?.is_some() {
                        removed += 1;
                    }
                }
                Ok(removed)
            })
            .map_err(transaction_error)?;
        self.db.flush()?;
        Ok(removed)
    }

    fn load(&self, hit_string: &[u8]) -> Result<Option<StoredHit>, StorageError> {
        let Some(raw) = self.hits.get(hit_string)? else {
            return Ok(None);
        };
        let record = decode_record(&raw)?;
        let creation_date = Utc
            .timestamp_micros(record.created_at_micros)
            .single()
            .ok_or_else(|| StorageError::Corrupted(lossy(hit_string)))?;
        Ok(Some(StoredHit {
            hit_string: lossy(hit_string),
            creation_date,
            retry: record.retry,
        }))
    }
}

fn decode_record(raw: &[u8]) -> Result<HitRecord, StorageError> {
    let (record, _) = bincode::serde::decode_from_slice(raw, bincode::config::standard())?;
    Ok(record)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn micros_key(at: DateTime<Utc>) -> [u8; 8] {
    (at.timestamp_micros().max(0) as u64).to_be_bytes()
}

fn order_key(at: DateTime<Utc>, id: u64) -> Vec<u8> {
    let mut key = micros_key(at).to_vec();
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Rewrites a hit for the offline queue: `cn` is forced to `offline` and an
/// `olt` is placed right after the first `ts` or `mh` parameter. An existing
/// `olt` is kept so resends stay linked to the original occurrence.
pub fn offline_hit_string(hit: &str, olt: &str) -> String {
    let (base, query) = hit.split_once('?').unwrap_or((hit, ""));
    let mut params: Vec<String> = query
        .split('&')
        .filter(|param| !param.is_empty())
        .map(|param| {
            if param == "cn" || param.starts_with("cn=") {
                "cn=offline".to_string()
            } else {
                param.to_string()
            }
        })
        .collect();

    let key_of = |param: &str| param.split('=').next().unwrap_or_default().to_string();

    if !params.iter().any(|param| key_of(param) == "cn") {
        params.push("cn=offline".to_string());
    }
    if !params.iter().any(|param| key_of(param) == "olt") {
        let anchor = params
            .iter()
            .position(|param| matches!(key_of(param).as_str(), "ts" | "mh"));
        let olt = format!("olt={olt}");
        match anchor {
            Some(index) => params.insert(index + 1, olt),
            None => params.push(olt),
        }
    }

    format!("{base}?{}", params.join("&"))
}

/// Small key/value store sharing the offline database, used for tracker
/// state that must survive restarts (visitor id, first launch).
#[derive(Clone)]
pub struct Preferences {
    db: Db,
    tree: Tree,
}

impl Preferences {
    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.tree.get(key)?.map(|value| lossy(&value)))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.tree.insert(key, value.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    /// Returns the stored value, creating it with `init` on first access.
    pub fn get_or_insert_with(&self, key: &str, init: impl FnOnce() -> String) -> Result<String, StorageError> {
        if let Some(existing) = self.get(key)? {
            return Ok(existing);
        }
        let value = init();
        self.set(key, &value)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_rewrite_places_olt_after_ts() {
        let hit = "https://logs.example.com/hit.xiti?s=1&idclient=a&ts=1.5&cn=wifi&p=Home";
        assert_eq!(
            offline_hit_string(hit, "1.5"),
            "https://logs.example.com/hit.xiti?s=1&idclient=a&ts=1.5&olt=1.5&cn=offline&p=Home"
        );
    }

    #[test]
    fn test_offline_rewrite_is_idempotent() {
        let once = offline_hit_string("http://h/x?s=1&mh=1-2-3&p=Home", "9.0");
        assert_eq!(once, "http://h/x?s=1&mh=1-2-3&olt=9.0&p=Home&cn=offline");
        assert_eq!(offline_hit_string(&once, "10.0"), once);
    }

    #[test]
    fn test_preferences_round_trip() {
        let storage = OfflineStorage::temporary().unwrap();
        let preferences = storage.preferences().unwrap();

        assert_eq!(preferences.get("idclient").unwrap(), None);
        let created = preferences.get_or_insert_with("idclient", || "abc".to_string()).unwrap();
        let again = preferences.get_or_insert_with("idclient", || "other".to_string()).unwrap();
        assert_eq!((created.as_str(), again.as_str()), ("abc", "abc"));
    }
}
