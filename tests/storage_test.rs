use chrono::{Duration, TimeZone, Utc};
use hit_tracker::reliability::{InsertOutcome, OfflineStorage, StorageConfig};
use tempfile::TempDir;

const HIT: &str = "https://logs.xiti.com/hit.xiti?s=1&ts=1714564800.000000&p=Home";

fn open(dir: &TempDir) -> OfflineStorage {
    OfflineStorage::open(&StorageConfig {
        path: dir.path().join("offline"),
        temporary: false,
    })
    .unwrap()
}

#[test]
fn test_stored_form_is_marked_offline() {
    let dir = TempDir::new().unwrap();
    let storage = open(&dir);

    storage.insert(HIT, Some("1714564800.000000")).unwrap();

    let hits = storage.get().unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].is_offline);
    assert_eq!(hits[0].retry_count, 0);
    assert_eq!(
        hits[0].url,
        "https://logs.xiti.com/hit.xiti?s=1&ts=1714564800.000000&olt=1714564800.000000&p=Home&cn=offline"
    );
}

#[test]
fn test_duplicate_insert_is_ignored() {
    let dir = TempDir::new().unwrap();
    let storage = open(&dir);

    assert_eq!(storage.insert(HIT, Some("1.0")).unwrap(), InsertOutcome::Inserted);
    assert_eq!(storage.insert(HIT, Some("1.0")).unwrap(), InsertOutcome::AlreadyStored);
    assert_eq!(storage.count(), 1);

    // A different olt is a different stored hit.
    assert_eq!(storage.insert(HIT, Some("2.0")).unwrap(), InsertOutcome::Inserted);
    assert_eq!(storage.count(), 2);
}

#[test]
fn test_ordering_follows_creation_date() {
    let dir = TempDir::new().unwrap();
    let storage = open(&dir);
    let base = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();

    storage.insert_at("https://h/?s=1&p=b", None, base + Duration::hours(1)).unwrap();
    storage.insert_at("https://h/?s=1&p=c", None, base + Duration::hours(2)).unwrap();
    storage.insert_at("https://h/?s=1&p=a", None, base).unwrap();

    let order: Vec<String> = storage.get().unwrap().into_iter().map(|hit| hit.url).collect();
    assert!(order[0].contains("p=a"));
    assert!(order[1].contains("p=b"));
    assert!(order[2].contains("p=c"));

    assert_eq!(storage.first().unwrap().unwrap().created_at, base);
    assert_eq!(storage.last().unwrap().unwrap().created_at, base + Duration::hours(2));
}

#[test]
fn test_delete_older_than_is_strict() {
    let dir = TempDir::new().unwrap();
    let storage = open(&dir);
    let cutoff = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

    storage.insert_at("https://h/?s=1&p=old", None, cutoff - Duration::days(3)).unwrap();
    storage.insert_at("https://h/?s=1&p=edge", None, cutoff).unwrap();
    storage.insert_at("https://h/?s=1&p=new", None, cutoff + Duration::days(1)).unwrap();

    assert_eq!(storage.delete_older_than(cutoff).unwrap(), 1);
    assert_eq!(storage.count(), 2);
    assert_eq!(storage.first().unwrap().unwrap().created_at, cutoff);
    assert_eq!(storage.delete_older_than(cutoff).unwrap(), 0);
}

#[test]
fn test_delete_single_and_all() {
    let dir = TempDir::new().unwrap();
    let storage = open(&dir);
    storage.insert("https://h/?s=1&p=a", None).unwrap();
    storage.insert("https://h/?s=1&p=b", None).unwrap();

    let first = storage.first().unwrap().unwrap();
    assert!(storage.exists(&first.url).unwrap());
    assert!(storage.delete(&first.url).unwrap());
    assert!(!storage.exists(&first.url).unwrap());
    assert!(!storage.delete(&first.url).unwrap());
    assert_eq!(storage.count(), 1);

    assert_eq!(storage.delete_all().unwrap(), 1);
    assert_eq!(storage.count(), 0);
    assert!(storage.first().unwrap().is_none());
    assert_eq!(storage.delete_all().unwrap(), 0);
}

#[test]
fn test_retry_counter() {
    let dir = TempDir::new().unwrap();
    let storage = open(&dir);
    storage.insert(HIT, Some("1.0")).unwrap();
    let stored = storage.first().unwrap().unwrap().url;

    assert_eq!(storage.increment_retry(&stored).unwrap(), Some(1));
    assert_eq!(storage.increment_retry(&stored).unwrap(), Some(2));
    assert_eq!(storage.get_hit(&stored).unwrap().unwrap().retry_count, 2);
    assert_eq!(storage.increment_retry("https://h/?missing").unwrap(), None);
}

#[test]
fn test_queue_and_preferences_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let created_at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();

    {
        let storage = open(&dir);
        storage.insert_at(HIT, Some("1.0"), created_at).unwrap();
        storage.preferences().unwrap().set("idclient", "visitor-1").unwrap();
    }

    let storage = open(&dir);
    assert_eq!(storage.count(), 1);
    let hit = storage.first().unwrap().unwrap();
    assert_eq!(hit.created_at, created_at);
    assert!(hit.url.contains("cn=offline"));

    let preferences = storage.preferences().unwrap();
    assert_eq!(preferences.get("idclient").unwrap().as_deref(), Some("visitor-1"));
    assert_eq!(
        preferences.get_or_insert_with("idclient", || "other".into()).unwrap(),
        "visitor-1"
    );
}
