use std::fmt;
use std::sync::Mutex;

/// Numeric event identifier, grouped by component base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u16);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Debug,
    Information,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub severity: Severity,
    pub message: String,
}

/// Receives every success and failure notification produced by the memory manager.
pub trait EventSink: Send + Sync {
    fn send(&self, event: Event);

    fn info(&self, id: EventId, message: String) {
        self.send(Event {
            id,
            severity: Severity::Information,
            message,
        });
    }

    fn error(&self, id: EventId, message: String) {
        self.send(Event {
            id,
            severity: Severity::Error,
            message,
        });
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn send(&self, event: Event) {
        let id = event.id.0;
        match event.severity {
            Severity::Debug => tracing::debug!(event_id = id, "{}", event.message),
            Severity::Information => tracing::info!(event_id = id, "{}", event.message),
            Severity::Error => tracing::error!(event_id = id, "{}", event.message),
            Severity::Critical => {
                tracing::error!(event_id = id, critical = true, "{}", event.message)
            }
        }
    }
}

/// Keeps every event in memory. Used by tests and by the CLI to echo results.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.lock())
    }

    pub fn last(&self) -> Option<Event> {
        self.lock().last().cloned()
    }

    pub fn contains(&self, id: EventId, severity: Severity) -> bool {
        self.lock()
            .iter()
            .any(|event| event.id == id && event.severity == severity)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Event>> {
        // A panic while holding the lock cannot leave the vector half-updated.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSink for RecordingEventSink {
    fn send(&self, event: Event) {
        TracingEventSink.send(event.clone());
        self.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order_and_severity() {
        let sink = RecordingEventSink::new();
        sink.info(EventId(21), "first".to_string());
        sink.error(EventId(22), "second".to_string());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "first");
        assert_eq!(events[1].severity, Severity::Error);
        assert!(sink.contains(EventId(22), Severity::Error));
        assert!(!sink.contains(EventId(22), Severity::Information));

        assert_eq!(sink.take().len(), 2);
        assert!(sink.events().is_empty());
    }
}
