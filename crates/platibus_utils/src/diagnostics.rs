//! Diagnostic events
//!
//! Components report lifecycle activity (enqueue, acknowledgement, delivery
//! failures, dead letters, subscription renewals) as typed events pushed
//! through a `DiagnosticEventSink`. The default sink logs through tracing;
//! tests collect events with `MemorySink`.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticEventKind {
    ComponentInitialized,
    MessageEnqueued,
    MessageDelivered,
    MessageDeliveryFailed,
    MessageAcknowledged,
    MessageNotAcknowledged,
    MessageExpired,
    DeadLetter,
    SubscriptionRenewed,
    SubscriptionFailed,
    EndpointNotFound,
    TransportFailure,
}

/// One diagnostic occurrence. `source` names the emitting component; the
/// optional fields carry whatever correlating detail the component has.
#[derive(Debug, Clone)]
pub struct DiagnosticEvent {
    pub source: &'static str,
    pub kind: DiagnosticEventKind,
    pub message_id: Option<String>,
    pub queue: Option<String>,
    pub topic: Option<String>,
    pub destination: Option<String>,
    pub http_status: Option<u16>,
    pub detail: Option<String>,
}

impl DiagnosticEvent {
    pub fn new(source: &'static str, kind: DiagnosticEventKind) -> Self {
        Self {
            source,
            kind,
            message_id: None,
            queue: None,
            topic: None,
            destination: None,
            http_status: None,
            detail: None,
        }
    }

    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

pub trait DiagnosticEventSink: Send + Sync {
    fn emit(&self, event: DiagnosticEvent);
}

/// Default sink: routes events to the tracing subscriber, failures at warn.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl DiagnosticEventSink for TracingEventSink {
    fn emit(&self, event: DiagnosticEvent) {
        match event.kind {
            DiagnosticEventKind::MessageDeliveryFailed
            | DiagnosticEventKind::MessageNotAcknowledged
            | DiagnosticEventKind::MessageExpired
            | DiagnosticEventKind::DeadLetter
            | DiagnosticEventKind::SubscriptionFailed
            | DiagnosticEventKind::EndpointNotFound
            | DiagnosticEventKind::TransportFailure => {
                warn!(source = event.source, ?event, "diagnostic event");
            }
            DiagnosticEventKind::ComponentInitialized => {
                info!(source = event.source, ?event, "diagnostic event");
            }
            _ => {
                debug!(source = event.source, ?event, "diagnostic event");
            }
        }
    }
}

/// Sink that retains every event; intended for assertions in tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<DiagnosticEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().expect("diagnostic sink poisoned").clone()
    }

    pub fn count(&self, kind: DiagnosticEventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

impl DiagnosticEventSink for MemorySink {
    fn emit(&self, event: DiagnosticEvent) {
        self.events
            .lock()
            .expect("diagnostic sink poisoned")
            .push(event);
    }
}
