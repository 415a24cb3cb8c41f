//! Notification surface consumed by the embedding application.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::domain::HitStatus;

/// Callbacks fired by the tracker. All of them are notifications; the
/// tracker never waits on or inspects the outcome.
pub trait TrackerDelegate: Send + Sync {
    fn tracker_needs_first_launch_approval(&self, _message: &str) {}
    fn build_did_end(&self, _status: HitStatus, _message: &str) {}
    fn send_did_end(&self, _status: HitStatus, _message: &str) {}
    fn save_did_end(&self, _message: &str) {}
    fn warning_did_occur(&self, _message: &str) {}
    fn error_did_occur(&self, _message: &str) {}
}

/// Delegate that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDelegate;

impl TrackerDelegate for NoopDelegate {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateEvent {
    FirstLaunchApproval(String),
    BuildDidEnd(HitStatus, String),
    SendDidEnd(HitStatus, String),
    SaveDidEnd(String),
    Warning(String),
    Error(String),
}

/// Forwards every callback into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelDelegate {
    tx: mpsc::UnboundedSender<DelegateEvent>,
}

impl ChannelDelegate {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DelegateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: DelegateEvent) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

impl TrackerDelegate for ChannelDelegate {
    fn tracker_needs_first_launch_approval(&self, message: &str) {
        self.emit(DelegateEvent::FirstLaunchApproval(message.to_string()));
    }

    fn build_did_end(&self, status: HitStatus, message: &str) {
        self.emit(DelegateEvent::BuildDidEnd(status, message.to_string()));
    }

    fn send_did_end(&self, status: HitStatus, message: &str) {
        self.emit(DelegateEvent::SendDidEnd(status, message.to_string()));
    }

    fn save_did_end(&self, message: &str) {
        self.emit(DelegateEvent::SaveDidEnd(message.to_string()));
    }

    fn warning_did_occur(&self, message: &str) {
        self.emit(DelegateEvent::Warning(message.to_string()));
    }

    fn error_did_occur(&self, message: &str) {
        self.emit(DelegateEvent::Error(message.to_string()));
    }
}

/// Logs each notification, then hands it to the current delegate.
pub struct Notifier {
    delegate: RwLock<Arc<dyn TrackerDelegate>>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(Arc::new(NoopDelegate))
    }
}

impl Notifier {
    pub fn new(delegate: Arc<dyn TrackerDelegate>) -> Self {
        Self {
            delegate: RwLock::new(delegate),
        }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn TrackerDelegate>) {
        *self.delegate.write() = delegate;
    }

    fn current(&self) -> Arc<dyn TrackerDelegate> {
        self.delegate.read().clone()
    }

    pub fn first_launch_approval(&self, message: &str) {
        info!("{}", message);
        self.current().tracker_needs_first_launch_approval(message);
    }

    pub fn build_did_end(&self, status: HitStatus, message: &str) {
        debug!("Hit built ({}): {}", status, message);
        self.current().build_did_end(status, message);
    }

    pub fn send_did_end(&self, status: HitStatus, message: &str) {
        match status {
            HitStatus::Success => debug!("Hit sent: {}", message),
            HitStatus::Failed => warn!("Hit not sent: {}", message),
        }
        self.current().send_did_end(status, message);
    }

    pub fn save_did_end(&self, message: &str) {
        info!("Hit saved offline: {}", message);
        self.current().save_did_end(message);
    }

    pub fn warning(&self, message: &str) {
        warn!("{}", message);
        self.current().warning_did_occur(message);
    }

    pub fn error(&self, message: &str) {
        error!("{}", message);
        self.current().error_did_occur(message);
    }
}
