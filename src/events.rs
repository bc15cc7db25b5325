//! In-process publish/subscribe for lifecycle events.
//!
//! Dispatch is synchronous and fire-and-forget. Each listener runs inside
//! its own failure boundary: an `Err` or a panic is logged and the remaining
//! listeners still run. Listeners may register or remove listeners while an
//! event is being dispatched; the change applies from the next emit.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::detection::DetectionSource;
use crate::error::Result;
use crate::history::DetectionRecord;
use crate::locale::Locale;

/// Why records were removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupReason {
    /// Older than the age cutoff.
    Expired,
    /// Repeated detections collapsed.
    Deduplicate,
    /// Over the size cap.
    Limit,
    /// Whole history cleared.
    Cleared,
}

/// What happened to the stored preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreferenceChange {
    /// Preference record saved.
    Saved,
    /// User override set.
    OverrideSet,
    /// User override removed.
    OverrideCleared,
    /// Every preference key removed.
    Cleared,
}

/// A lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LocaleEvent {
    /// A detection record was appended.
    RecordAdded {
        /// The new record.
        record: DetectionRecord,
        /// History length after the append.
        history_len: usize,
        /// Epoch ms.
        timestamp: i64,
    },
    /// Records were removed by maintenance.
    Cleanup {
        /// Why.
        reason: CleanupReason,
        /// Records removed.
        removed: usize,
        /// Records left.
        remaining: usize,
        /// Epoch ms.
        timestamp: i64,
    },
    /// History was exported.
    Export {
        /// Records in the bundle.
        record_count: usize,
        /// Bundle integrity checksum.
        checksum: String,
        /// Epoch ms.
        timestamp: i64,
    },
    /// History was replaced from a bundle or backup.
    Import {
        /// Records now in history.
        record_count: usize,
        /// Bundle version or backup id.
        origin: String,
        /// Epoch ms.
        timestamp: i64,
    },
    /// An operation failed or found bad data.
    Error {
        /// Operation name.
        operation: String,
        /// Failure description.
        message: String,
        /// Epoch ms.
        timestamp: i64,
    },
    /// The stored preference or override changed.
    PreferenceChanged {
        /// What changed.
        change: PreferenceChange,
        /// Locale now in effect, if any.
        locale: Option<Locale>,
        /// Source of that locale, if any.
        source: Option<DetectionSource>,
        /// Epoch ms.
        timestamp: i64,
    },
}

/// Discriminant of [`LocaleEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `record-added`
    RecordAdded,
    /// `cleanup`
    Cleanup,
    /// `export`
    Export,
    /// `import`
    Import,
    /// `error`
    Error,
    /// `preference-changed`
    PreferenceChanged,
}

impl EventKind {
    /// All kinds.
    pub const ALL: [EventKind; 6] = [
        EventKind::RecordAdded,
        EventKind::Cleanup,
        EventKind::Export,
        EventKind::Import,
        EventKind::Error,
        EventKind::PreferenceChanged,
    ];

    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::RecordAdded => "record-added",
            EventKind::Cleanup => "cleanup",
            EventKind::Export => "export",
            EventKind::Import => "import",
            EventKind::Error => "error",
            EventKind::PreferenceChanged => "preference-changed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LocaleEvent {
    /// This event's kind.
    pub const fn kind(&self) -> EventKind {
        match self {
            LocaleEvent::RecordAdded { .. } => EventKind::RecordAdded,
            LocaleEvent::Cleanup { .. } => EventKind::Cleanup,
            LocaleEvent::Export { .. } => EventKind::Export,
            LocaleEvent::Import { .. } => EventKind::Import,
            LocaleEvent::Error { .. } => EventKind::Error,
            LocaleEvent::PreferenceChanged { .. } => EventKind::PreferenceChanged,
        }
    }

    /// Build an error event.
    pub fn error(operation: impl Into<String>, message: impl Into<String>, timestamp: i64) -> Self {
        LocaleEvent::Error { operation: operation.into(), message: message.into(), timestamp }
    }
}

/// Handle returned by [`EventBus::add_event_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&LocaleEvent) -> Result<()>>;

struct Registration {
    id: ListenerId,
    kind: EventKind,
    listener: Listener,
}

/// Outcome of one emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    /// Listeners that returned `Err` or panicked.
    pub failed: usize,
}

/// Typed listener registry.
#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<Vec<Registration>>,
    next_id: Cell<u64>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to events of `kind`.
    pub fn add_event_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&LocaleEvent) -> Result<()> + 'static,
    {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.listeners.borrow_mut().push(Registration { id, kind, listener: Rc::new(listener) });
        debug!(kind = %kind, "listener added");
        id
    }

    /// Unsubscribe. Returns `false` if no such listener was registered for `kind`.
    pub fn remove_event_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|r| !(r.kind == kind && r.id == id));
        before != listeners.len()
    }

    /// Drop every listener.
    pub fn remove_all_listeners(&self) {
        self.listeners.borrow_mut().clear();
    }

    /// Listeners subscribed to `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.borrow().iter().filter(|r| r.kind == kind).count()
    }

    /// Deliver `event` to every listener of its kind.
    pub fn emit_event(&self, event: &LocaleEvent) -> DispatchReport {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| Rc::clone(&r.listener))
            .collect();

        let mut report = DispatchReport::default();
        for listener in targets {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!(kind = %kind, error = %e, "event listener failed");
                    report.failed += 1;
                },
                Err(_) => {
                    warn!(kind = %kind, "event listener panicked");
                    report.failed += 1;
                },
            }
        }
        report
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").field("listeners", &self.listeners.borrow().len()).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn error_event() -> LocaleEvent {
        LocaleEvent::error("test", "boom", 1)
    }

    #[test]
    fn test_dispatch_by_kind() {
        let bus = EventBus::new();
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        bus.add_event_listener(EventKind::Error, move |_| {
            counter.set(counter.get() + 1);
            Ok(())
        });

        bus.emit_event(&error_event());
        bus.emit_event(&LocaleEvent::Export { record_count: 0, checksum: "0".into(), timestamp: 1 });
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_failing_listeners_do_not_stop_others() {
        let bus = EventBus::new();
        let reached = Rc::new(Cell::new(false));
        bus.add_event_listener(EventKind::Error, |_| Err(Error::other("listener error")));
        bus.add_event_listener(EventKind::Error, |_| panic!("listener panic"));
        let flag = Rc::clone(&reached);
        bus.add_event_listener(EventKind::Error, move |_| {
            flag.set(true);
            Ok(())
        });

        let report = bus.emit_event(&error_event());
        assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });
        assert!(reached.get());
    }

    #[test]
    fn test_remove_listener() {
        let bus = EventBus::new();
        let id = bus.add_event_listener(EventKind::Cleanup, |_| Ok(()));
        assert!(!bus.remove_event_listener(EventKind::Error, id));
        assert!(bus.remove_event_listener(EventKind::Cleanup, id));
        assert!(!bus.remove_event_listener(EventKind::Cleanup, id));
        assert_eq!(bus.listener_count(EventKind::Cleanup), 0);
    }

    #[test]
    fn test_remove_all_listeners() {
        let bus = EventBus::new();
        for kind in EventKind::ALL {
            bus.add_event_listener(kind, |_| Ok(()));
        }
        bus.remove_all_listeners();
        assert!(EventKind::ALL.iter().all(|k| bus.listener_count(*k) == 0));
        assert_eq!(bus.emit_event(&error_event()), DispatchReport::default());
    }

    #[test]
    fn test_listener_may_subscribe_during_dispatch() {
        let bus = Rc::new(EventBus::new());
        let inner = Rc::clone(&bus);
        bus.add_event_listener(EventKind::Error, move |_| {
            inner.add_event_listener(EventKind::Error, |_| Ok(()));
            Ok(())
        });
        assert_eq!(bus.emit_event(&error_event()).delivered, 1);
        assert_eq!(bus.listener_count(EventKind::Error), 2);
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(LocaleEvent::Cleanup {
            reason: CleanupReason::Expired,
            removed: 2,
            remaining: 3,
            timestamp: 10,
        })
        .unwrap();
        assert_eq!(json["type"], "cleanup");
        assert_eq!(json["reason"], "expired");
        assert_eq!(EventKind::RecordAdded.to_string(), "record-added");
    }
}
