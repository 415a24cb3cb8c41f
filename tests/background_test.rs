use std::collections::HashMap;
use std::sync::Arc;

use hit_tracker::Tracker;
use hit_tracker::reliability::{BackgroundHost, ExpirationHandler, RetryConfig};
use parking_lot::Mutex;
use tokio_test::assert_ok;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingHost {
    started: Mutex<HashMap<u64, ExpirationHandler>>,
    ended: Mutex<Vec<u64>>,
}

impl BackgroundHost for RecordingHost {
    fn begin_extension(&self, key: u64, on_expire: ExpirationHandler) {
        self.started.lock().insert(key, on_expire);
    }

    fn end_extension(&self, key: u64) {
        self.ended.lock().push(key);
    }
}

async fn tracker_with_backlog(server: &MockServer, host: Arc<RecordingHost>, background: bool) -> Tracker {
    let tracker = Tracker::builder()
        .config("domain", &server.address().to_string())
        .config("site", "1")
        .config("secure", "false")
        .config("storage", "required")
        .config("enableBackgroundTask", &background.to_string())
        .retry(RetryConfig::no_retry())
        .background_host(host)
        .build()
        .await
        .unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;
    tracker.set_param("p", "Home");
    assert_ok!(tracker.dispatch().await);
    assert_eq!(tracker.offline().count(), 1);

    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    tracker
}

#[tokio::test]
async fn test_background_flush_runs_under_an_extension() {
    let server = MockServer::start().await;
    let host = Arc::new(RecordingHost::default());
    let tracker = tracker_with_backlog(&server, host.clone(), true).await;

    let report = assert_ok!(tracker.application_did_enter_background().await);

    assert_eq!(report.delivered, 1);
    assert!(!report.cancelled);
    assert_eq!(tracker.offline().count(), 0);
    assert_eq!(host.started.lock().len(), 1);
    assert_eq!(*host.ended.lock(), vec![1]);
    assert_eq!(tracker.background_tasks(), 0);
}

#[tokio::test]
async fn test_disabled_background_task_still_flushes() {
    let server = MockServer::start().await;
    let host = Arc::new(RecordingHost::default());
    let tracker = tracker_with_backlog(&server, host.clone(), false).await;

    let report = assert_ok!(tracker.application_did_enter_background().await);

    assert_eq!(report.delivered, 1);
    assert!(host.started.lock().is_empty());
    assert!(host.ended.lock().is_empty());
}

#[tokio::test]
async fn test_late_expiry_after_end_is_ignored() {
    let server = MockServer::start().await;
    let host = Arc::new(RecordingHost::default());
    let tracker = tracker_with_backlog(&server, host.clone(), true).await;

    assert_ok!(tracker.application_did_enter_background().await);
    let handler = host.started.lock().remove(&1).unwrap();
    handler();

    assert_eq!(*host.ended.lock(), vec![1]);
    assert_eq!(tracker.background_tasks(), 0);
}
