//! Observer adapters that expose engine and store state to a presentation
//! layer.
//!
//! A binding subscribes to the event bus on attach and unsubscribes when
//! dropped. Bus listeners hold only weak references, so a binding never
//! keeps the engine or the store alive.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::events::{EventBus, EventKind, ListenerId, LocaleEvent};
use crate::history::{DetectionHistory, HistoryEngine};
use crate::locale::Locale;
use crate::preference::{PreferenceStore, UserLocalePreference};

/// Handle returned by [`Observable::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber<T> = Rc<dyn Fn(&T)>;

/// A value cell that notifies subscribers when it changes.
pub struct Observable<T> {
    value: RefCell<T>,
    subscribers: RefCell<Vec<(SubscriptionId, Subscriber<T>)>>,
    next_id: Cell<u64>,
}

impl<T: Clone + PartialEq> Observable<T> {
    /// Create a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self { value: RefCell::new(value), subscribers: RefCell::new(Vec::new()), next_id: Cell::new(0) }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Replace the value. Subscribers run only if it differs from the
    /// current one. Returns whether it changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.value.borrow_mut();
            if *current == value {
                return false;
            }
            *current = value.clone();
        }
        let subscribers: Vec<Subscriber<T>> =
            self.subscribers.borrow().iter().map(|(_, s)| Rc::clone(s)).collect();
        for subscriber in subscribers {
            subscriber(&value);
        }
        true
    }

    /// Run `f` on every future change.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.subscribers.borrow_mut().push((id, Rc::new(f)));
        id
    }

    /// Stop notifying `id`. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        before != subscribers.len()
    }

    /// Active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.value.borrow())
            .field("subscribers", &self.subscribers.borrow().len())
            .finish()
    }
}

/// Bus registrations removed on drop.
struct Attachment {
    bus: Rc<EventBus>,
    listeners: Vec<(EventKind, ListenerId)>,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        for (kind, id) in self.listeners.drain(..) {
            self.bus.remove_event_listener(kind, id);
        }
    }
}

/// Live view of the detection history.
pub struct HistoryBinding {
    history: Rc<Observable<DetectionHistory>>,
    last_error: Rc<Observable<Option<String>>>,
    _attachment: Attachment,
}

impl HistoryBinding {
    /// Mirror `engine`'s history, refreshed on every history event.
    pub fn attach(engine: &Rc<HistoryEngine>, bus: &Rc<EventBus>) -> Self {
        let history = Rc::new(Observable::new(engine.get_history()));
        let last_error = Rc::new(Observable::new(None));
        let mut listeners = Vec::new();

        for kind in [EventKind::RecordAdded, EventKind::Cleanup, EventKind::Import] {
            let engine: Weak<HistoryEngine> = Rc::downgrade(engine);
            let target = Rc::downgrade(&history);
            let id = bus.add_event_listener(kind, move |_| {
                if let (Some(engine), Some(target)) = (engine.upgrade(), target.upgrade()) {
                    target.set(engine.get_history());
                }
                Ok(())
            });
            listeners.push((kind, id));
        }

        let target = Rc::downgrade(&last_error);
        let id = bus.add_event_listener(EventKind::Error, move |event| {
            if let (Some(target), LocaleEvent::Error { operation, message, .. }) =
                (target.upgrade(), event)
            {
                target.set(Some(format!("{operation}: {message}")));
            }
            Ok(())
        });
        listeners.push((EventKind::Error, id));

        Self { history, last_error, _attachment: Attachment { bus: Rc::clone(bus), listeners } }
    }

    /// The mirrored history.
    pub fn history(&self) -> &Observable<DetectionHistory> {
        &self.history
    }

    /// Most recent error reported on the bus.
    pub fn last_error(&self) -> &Observable<Option<String>> {
        &self.last_error
    }
}

impl fmt::Debug for HistoryBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryBinding").field("records", &self.history.get().len()).finish()
    }
}

/// Live view of the preference, the override and the locale in effect.
pub struct PreferenceBinding {
    preference: Rc<Observable<UserLocalePreference>>,
    user_override: Rc<Observable<Option<Locale>>>,
    locale: Rc<Observable<Locale>>,
    _attachment: Attachment,
}

impl PreferenceBinding {
    /// Mirror `store`, refreshed on every `preference-changed` event.
    pub fn attach(store: &Rc<PreferenceStore>, bus: &Rc<EventBus>) -> Self {
        let preference = store.get();
        let user_override = store.get_override();
        let locale = Rc::new(Observable::new(user_override.unwrap_or(preference.locale)));
        let preference = Rc::new(Observable::new(preference));
        let user_override = Rc::new(Observable::new(user_override));

        let weak_store = Rc::downgrade(store);
        let (p, o, l) =
            (Rc::downgrade(&preference), Rc::downgrade(&user_override), Rc::downgrade(&locale));
        let id = bus.add_event_listener(EventKind::PreferenceChanged, move |_| {
            let Some(store) = weak_store.upgrade() else { return Ok(()) };
            let current = store.get();
            let ovr = store.get_override();
            if let Some(l) = l.upgrade() {
                l.set(ovr.unwrap_or(current.locale));
            }
            if let Some(o) = o.upgrade() {
                o.set(ovr);
            }
            if let Some(p) = p.upgrade() {
                p.set(current);
            }
            Ok(())
        });

        Self {
            preference,
            user_override,
            locale,
            _attachment: Attachment {
                bus: Rc::clone(bus),
                listeners: vec![(EventKind::PreferenceChanged, id)],
            },
        }
    }

    /// The stored (or synthesized) preference.
    pub fn preference(&self) -> &Observable<UserLocalePreference> {
        &self.preference
    }

    /// The explicit override.
    pub fn user_override(&self) -> &Observable<Option<Locale>> {
        &self.user_override
    }

    /// The override if set, else the preferred locale.
    pub fn locale(&self) -> &Observable<Locale> {
        &self.locale
    }
}

impl fmt::Debug for PreferenceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferenceBinding").field("locale", &self.locale.get()).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::{DEFAULT_CACHE_TTL, StorageCache};
    use crate::clock::ManualClock;
    use crate::detection::DetectionSource;
    use crate::storage::{BackendChain, MemoryStore};

    struct World {
        engine: Rc<HistoryEngine>,
        store: Rc<PreferenceStore>,
        bus: Rc<EventBus>,
        local: MemoryStore,
    }

    fn world() -> World {
        let local = MemoryStore::new("local");
        let chain = Rc::new(BackendChain::new(vec![Box::new(local.clone())]));
        let clock = Rc::new(ManualClock::new(1_700_000_000_000));
        let bus = Rc::new(EventBus::new());
        let cache = StorageCache::new(DEFAULT_CACHE_TTL, clock.clone());
        let engine = Rc::new(HistoryEngine::new(
            Rc::clone(&chain),
            cache,
            Rc::clone(&bus),
            clock.clone(),
            10,
        ));
        let store = Rc::new(PreferenceStore::new(chain, Rc::clone(&bus), clock, Locale::En));
        World { engine, store, bus, local }
    }

    #[test]
    fn test_observable_notifies_only_on_change() {
        let cell = Observable::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = cell.subscribe(move |v| sink.borrow_mut().push(*v));
        assert!(cell.set(2));
        assert!(!cell.set(2));
        assert!(cell.unsubscribe(id));
        assert!(!cell.unsubscribe(id));
        cell.set(3);
        assert_eq!(*seen.borrow(), vec![2]);
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn test_subscriber_may_read_the_cell() {
        let cell = Rc::new(Observable::new(0));
        let inner = Rc::clone(&cell);
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        cell.subscribe(move |_| sink.set(inner.get()));
        cell.set(7);
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn test_history_binding_follows_engine() {
        let w = world();
        let binding = HistoryBinding::attach(&w.engine, &w.bus);
        let changes = Rc::new(Cell::new(0));
        let sink = Rc::clone(&changes);
        binding.history().subscribe(move |_| sink.set(sink.get() + 1));

        w.engine.add_record(Locale::Zh, DetectionSource::Browser, 0.7, None).unwrap();
        assert_eq!(binding.history().get().len(), 1);
        w.engine.clear_all().unwrap();
        assert!(binding.history().get().is_empty());
        assert_eq!(changes.get(), 2);
    }

    #[test]
    fn test_history_binding_surfaces_errors() {
        let w = world();
        let binding = HistoryBinding::attach(&w.engine, &w.bus);
        w.local.fail_writes(true);
        assert!(w.engine.add_record(Locale::Zh, DetectionSource::User, 1.0, None).is_err());
        assert!(binding.last_error().get().unwrap().contains("history.add_record"));
    }

    #[test]
    fn test_drop_detaches_from_bus() {
        let w = world();
        {
            let _binding = HistoryBinding::attach(&w.engine, &w.bus);
            assert_eq!(w.bus.listener_count(EventKind::RecordAdded), 1);
        }
        assert_eq!(w.bus.listener_count(EventKind::RecordAdded), 0);
        assert_eq!(w.bus.listener_count(EventKind::Error), 0);
    }

    #[test]
    fn test_preference_binding_tracks_override() {
        let w = world();
        let binding = PreferenceBinding::attach(&w.store, &w.bus);
        assert_eq!(binding.locale().get(), Locale::En);

        w.store.set_override(Locale::Zh);
        assert_eq!(binding.locale().get(), Locale::Zh);
        assert_eq!(binding.user_override().get(), Some(Locale::Zh));
        assert_eq!(binding.preference().get().source, DetectionSource::User);

        w.store.clear_override();
        assert_eq!(binding.user_override().get(), None);
        // The user preference written with the override remains.
        assert_eq!(binding.locale().get(), Locale::Zh);

        w.store.clear_all();
        assert_eq!(binding.locale().get(), Locale::En);
    }

    #[test]
    fn test_binding_outliving_store_is_inert() {
        let w = world();
        let binding = PreferenceBinding::attach(&w.store, &w.bus);
        let bus = Rc::clone(&w.bus);
        drop(w);
        bus.emit_event(&LocaleEvent::PreferenceChanged {
            change: crate::events::PreferenceChange::Cleared,
            locale: None,
            source: None,
            timestamp: 0,
        });
        assert_eq!(binding.locale().get(), Locale::En);
    }
}
