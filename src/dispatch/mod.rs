//! Dispatch: turns pending events into built hits and hands them to the
//! sender.

pub mod event;
pub mod grouping;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::buffer::{Buffer, BufferWriter};
use crate::builder::Builder;
use crate::domain::HitStatus;
use crate::sender::{HitSender, SendOutcome};
use crate::tracker::configuration::Configuration;
use crate::tracker::delegate::Notifier;

pub use event::{AdAction, BasicEvent, EventCategory, PendingEvent};
pub use grouping::plan_flushes;

/// Events added to the tracker and not yet part of a built hit, in
/// insertion order. Ids are unique; re-adding an id replaces the event.
#[derive(Default)]
pub struct PendingEvents {
    events: Vec<Arc<dyn PendingEvent>>,
}

impl PendingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, event: Arc<dyn PendingEvent>) {
        let id = event.id();
        match self.events.iter_mut().find(|e| e.id() == id) {
            Some(slot) => *slot = event,
            None => self.events.push(event),
        }
    }

    pub fn remove(&mut self, ids: &[Uuid]) {
        self.events.retain(|e| !ids.contains(&e.id()));
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.events.iter().any(|e| e.id() == id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Snapshot ordered by creation date; ties keep insertion order.
    pub fn sorted(&self) -> Vec<Arc<dyn PendingEvent>> {
        let mut events = self.events.clone();
        events.sort_by_key(|e| e.created_at());
        events
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub groups: usize,
    pub hits: usize,
    pub delivered: usize,
    pub stored: usize,
    pub failed: usize,
    pub abandoned: usize,
}

impl DispatchReport {
    fn record(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Delivered => self.delivered += 1,
            SendOutcome::Stored => self.stored += 1,
            SendOutcome::Failed => self.failed += 1,
            SendOutcome::Abandoned => self.abandoned += 1,
        }
    }
}

pub struct Dispatcher {
    sender: Arc<HitSender>,
    notifier: Arc<Notifier>,
}

impl Dispatcher {
    pub fn new(sender: Arc<HitSender>, notifier: Arc<Notifier>) -> Self {
        Self { sender, notifier }
    }

    pub fn sender(&self) -> &Arc<HitSender> {
        &self.sender
    }

    /// Builds and sends one hit per planned group of pending events.
    ///
    /// With nothing pending, the buffer alone is built and sent once. An
    /// unusable endpoint configuration is reported and aborts the pass
    /// before anything is consumed.
    pub async fn dispatch(
        &self,
        buffer: &Mutex<Buffer>,
        pending: &Mutex<PendingEvents>,
        configuration: &Configuration,
        resend: &CancellationToken,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        let endpoint = match configuration.endpoint() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.notifier.error(&e.to_string());
                return report;
            }
        };
        let mode = configuration.offline_mode();
        let builder = Builder::new(configuration.multihit_policy());

        let events = pending.lock().sorted();
        let categories: Vec<_> = events.iter().map(|e| e.category()).collect();
        let groups = if events.is_empty() {
            vec![Vec::new()]
        } else {
            plan_flushes(&categories)
        };
        debug!("Dispatching {} pending events in {} groups", events.len(), groups.len());

        for group in groups {
            let members: Vec<&Arc<dyn PendingEvent>> = group.iter().map(|&i| &events[i]).collect();

            let (params, warnings) = {
                let mut buffer = buffer.lock();
                let mut writer = BufferWriter::new(&mut buffer);
                for event in &members {
                    event.populate(&mut writer);
                }
                let warnings = writer.finish();
                let params = buffer.params();
                buffer.clear_volatile();
                (params, warnings)
            };
            for warning in warnings {
                self.notifier.warning(&warning.to_string());
            }

            let ids: Vec<Uuid> = members.iter().map(|e| e.id()).collect();
            pending.lock().remove(&ids);

            let output = builder.build(&endpoint, &params);
            for warning in &output.warnings {
                self.notifier.warning(warning);
            }

            report.groups += 1;
            for hit in &output.hits {
                self.notifier.build_did_end(HitStatus::Success, &hit.url);
                report.hits += 1;
                let outcome = self.sender.send(hit, mode, resend).await;
                report.record(outcome);
            }
        }

        info!(
            "Dispatch done: {} hits ({} delivered, {} stored, {} failed)",
            report.hits, report.delivered, report.stored, report.failed
        );
        report
    }
}
