use std::sync::Arc;

use chrono::{Duration, Utc};
use hit_tracker::reliability::{RetryConfig, RetryStrategy};
use hit_tracker::tracker::{ChannelDelegate, DelegateEvent};
use hit_tracker::{BasicEvent, HitStatus, Tracker};
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn tracker_for(server: &MockServer, storage: &str) -> (Tracker, UnboundedReceiver<DelegateEvent>) {
    let (delegate, rx) = ChannelDelegate::channel();
    let tracker = Tracker::builder()
        .config("domain", &server.address().to_string())
        .config("site", "549808")
        .config("secure", "false")
        .config("storage", storage)
        .retry(RetryConfig::no_retry())
        .delegate(Arc::new(delegate))
        .build()
        .await
        .unwrap();
    (tracker, rx)
}

async fn respond_with(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/hit.xiti"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

fn drain(rx: &mut UnboundedReceiver<DelegateEvent>) -> Vec<DelegateEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn query_value(url: &url::Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn test_buffer_only_dispatch_is_delivered() {
    let server = MockServer::start().await;
    respond_with(&server, 200).await;
    let (tracker, mut rx) = tracker_for(&server, "required").await;

    tracker.set_param("type", "screen").set_param("p", "Home");
    let report = tracker.dispatch().await.unwrap();

    assert_eq!(report.hits, 1);
    assert_eq!(report.delivered, 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let url = &requests[0].url;
    assert!(url.as_str().contains("&type=screen&p=Home"));
    assert_eq!(query_value(url, "s").as_deref(), Some("549808"));
    assert!(query_value(url, "idclient").is_some());
    assert!(query_value(url, "ts").is_some());

    let events = drain(&mut rx);
    assert!(events.contains(&DelegateEvent::SendDidEnd(HitStatus::Success, "OK".into())));
    assert!(
        events
            .iter()
            .any(|event| matches!(event, DelegateEvent::BuildDidEnd(HitStatus::Success, _)))
    );

    // Volatile parameters were consumed.
    assert!(tracker.buffer().volatile().is_empty());
}

#[tokio::test]
async fn test_failed_hit_is_stored_then_resent() {
    let server = MockServer::start().await;
    respond_with(&server, 500).await;
    let (tracker, mut rx) = tracker_for(&server, "required").await;

    tracker.set_param("p", "Checkout");
    let report = tracker.dispatch().await.unwrap();
    assert_eq!(report.stored, 1);
    assert_eq!(tracker.offline().count(), 1);

    let stored = tracker.offline().oldest().unwrap();
    assert!(stored.is_offline);
    assert!(stored.url.contains("cn=offline"));
    assert!(stored.url.contains("&olt="));
    assert!(
        drain(&mut rx)
            .iter()
            .any(|event| matches!(event, DelegateEvent::SaveDidEnd(_)))
    );

    server.reset().await;
    respond_with(&server, 200).await;

    let flush = tracker.offline().dispatch().await;
    assert_eq!(flush.delivered, 1);
    assert_eq!(flush.remaining, 0);
    assert_eq!(tracker.offline().count(), 0);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(query_value(&requests[0].url, "cn").as_deref(), Some("offline"));
}

#[tokio::test]
async fn test_resend_failure_keeps_hit_and_counts_retry() {
    let server = MockServer::start().await;
    respond_with(&server, 503).await;
    let (tracker, _rx) = tracker_for(&server, "always").await;

    tracker.set_param("p", "Home");
    tracker.dispatch().await.unwrap();

    let flush = tracker.offline().dispatch().await;
    assert_eq!(flush.failed, 1);
    assert_eq!(flush.remaining, 1);
    assert_eq!(tracker.offline().oldest().unwrap().retry_count, 1);
}

#[tokio::test]
async fn test_always_mode_never_touches_the_network() {
    let server = MockServer::start().await;
    respond_with(&server, 200).await;
    let (tracker, _rx) = tracker_for(&server, "always").await;

    tracker.set_param("p", "Home");
    let report = tracker.dispatch().await.unwrap();
    assert_eq!(report.stored, 1);

    // Automatic flushes are skipped in this mode.
    let flush = tracker.application_did_become_active().await.unwrap();
    assert_eq!(flush.delivered, 0);
    assert_eq!(flush.remaining, 1);

    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(tracker.offline().count(), 1);
}

#[tokio::test]
async fn test_never_mode_drops_failed_hit() {
    let server = MockServer::start().await;
    respond_with(&server, 500).await;
    let (tracker, mut rx) = tracker_for(&server, "never").await;

    tracker.set_param("p", "Home");
    let report = tracker.dispatch().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(tracker.offline().count(), 0);
    assert!(
        drain(&mut rx)
            .iter()
            .any(|event| matches!(event, DelegateEvent::SendDidEnd(HitStatus::Failed, _)))
    );
}

#[tokio::test]
async fn test_missing_domain_is_reported_without_sending() {
    let server = MockServer::start().await;
    respond_with(&server, 200).await;
    let (tracker, mut rx) = tracker_for(&server, "required").await;
    assert!(tracker.set_config("domain", "").wait().await.unwrap());

    tracker.add_event(BasicEvent::screen("Home"));
    let report = tracker.dispatch().await.unwrap();

    assert_eq!(report.hits, 0);
    assert_eq!(tracker.pending_events(), 1);
    assert_eq!(tracker.offline().count(), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(
        drain(&mut rx)
            .iter()
            .any(|event| matches!(event, DelegateEvent::Error(_)))
    );
}

#[tokio::test]
async fn test_products_and_screen_are_sent_separately() {
    let server = MockServer::start().await;
    respond_with(&server, 200).await;
    let (tracker, _rx) = tracker_for(&server, "never").await;

    let now = Utc::now();
    tracker.add_event(BasicEvent::product("p1").at(now - Duration::seconds(3)));
    tracker.add_event(BasicEvent::product("p2").at(now - Duration::seconds(2)));
    tracker.add_event(BasicEvent::screen("Catalog").at(now - Duration::seconds(1)));

    let report = tracker.dispatch().await.unwrap();
    assert_eq!(report.groups, 2);
    assert_eq!(report.delivered, 2);
    assert_eq!(tracker.pending_events(), 0);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(query_value(&requests[0].url, "pdtl").as_deref(), Some("p1|p2"));
    assert_eq!(query_value(&requests[0].url, "p"), None);
    assert_eq!(query_value(&requests[1].url, "p").as_deref(), Some("Catalog"));
    assert_eq!(query_value(&requests[1].url, "pdtl"), None);
}

#[tokio::test]
async fn test_transient_errors_are_retried_before_storing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    respond_with(&server, 200).await;

    let tracker = Tracker::builder()
        .config("domain", &server.address().to_string())
        .config("site", "1")
        .config("secure", "false")
        .retry(RetryConfig {
            max_attempts: 3,
            base_delay: std::time::Duration::from_millis(5),
            max_delay: std::time::Duration::from_millis(20),
            strategy: RetryStrategy::ExponentialBackoff,
            jitter: false,
        })
        .build()
        .await
        .unwrap();

    tracker.set_param("p", "Home");
    let report = tracker.dispatch().await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(tracker.offline().count(), 0);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_out_of_range_retention_is_reported() {
    let server = MockServer::start().await;
    respond_with(&server, 200).await;
    let (tracker, mut rx) = tracker_for(&server, "always").await;

    tracker.set_param("p", "Home");
    tracker.dispatch().await.unwrap();
    drain(&mut rx);

    assert_eq!(tracker.offline().delete_older_than_days(i64::MAX), -1);
    assert_eq!(tracker.offline().delete_older_than_days(i64::MIN), -1);
    assert_eq!(tracker.offline().count(), 1);
    assert!(
        drain(&mut rx)
            .iter()
            .any(|event| matches!(event, DelegateEvent::Error(_)))
    );
}
