//! # Navigation Events
//!
//! The typed events the router broadcasts, the static catalog describing
//! them, and a small publish/subscribe registry.
//!
//! The catalog is the contract other subsystems rely on to know which events
//! correspond to a new browser history entry:
//!
//! | event                   | history entry        |
//! |-------------------------|----------------------|
//! | `hashSet`               | push                 |
//! | `hashReplaced`          | replace              |
//! | `hashChanged`           | push                 |
//! | `hashUpdated`           | replace              |
//! | `shellHashChanged`      | push                 |
//! | `shellHashParamChanged` | decided by the writer|

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;
use serde::Serialize;

use crate::core::hash::{GrammarError, Params};

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    HashSet,
    HashReplaced,
    HashChanged,
    HashUpdated,
    ShellHashChanged,
    ShellHashParamChanged,
}

/// Whether firing an event goes with a new history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HistoryPolicy {
    Push,
    Replace,
    /// The code that eventually writes the location decides.
    Deferred,
}

#[derive(Debug, Serialize)]
pub struct EventDescriptor {
    pub kind: EventKind,
    pub name: &'static str,
    /// `(generic name, payload field)` pairs for history-detection integrations.
    pub param_mapping: &'static [(&'static str, &'static str)],
    pub creates_history_entry: Option<bool>,
}

impl EventDescriptor {
    pub fn history_policy(&self) -> HistoryPolicy {
        match self.creates_history_entry {
            Some(true) => HistoryPolicy::Push,
            Some(false) => HistoryPolicy::Replace,
            None => HistoryPolicy::Deferred,
        }
    }
}

// Order must follow the `EventKind` declaration order.
static CATALOG: [EventDescriptor; 6] = [
    EventDescriptor {
        kind: EventKind::HashSet,
        name: "hashSet",
        param_mapping: &[("hash", "sHash")],
        creates_history_entry: Some(true),
    },
    EventDescriptor {
        kind: EventKind::HashReplaced,
        name: "hashReplaced",
        param_mapping: &[("hash", "sHash")],
        creates_history_entry: Some(false),
    },
    EventDescriptor {
        kind: EventKind::HashChanged,
        name: "hashChanged",
        param_mapping: &[("newHash", "newHash"), ("oldHash", "oldHash")],
        creates_history_entry: Some(true),
    },
    EventDescriptor {
        kind: EventKind::HashUpdated,
        name: "hashUpdated",
        param_mapping: &[("newHash", "newHash"), ("oldHash", "oldHash")],
        creates_history_entry: Some(false),
    },
    EventDescriptor {
        kind: EventKind::ShellHashChanged,
        name: "shellHashChanged",
        param_mapping: &[
            ("newHash", "newShellHash"),
            ("newAppHash", "newAppSpecificHash"),
            ("oldHash", "oldShellHash"),
            ("oldAppHash", "oldAppSpecificHash"),
        ],
        creates_history_entry: Some(true),
    },
    EventDescriptor {
        kind: EventKind::ShellHashParamChanged,
        name: "shellHashParamChanged",
        param_mapping: &[
            ("newParameters", "newParameters"),
            ("oldParameters", "oldParameters"),
        ],
        creates_history_entry: None,
    },
];

/// All event descriptors, in declaration order.
pub fn catalog() -> &'static [EventDescriptor] {
    &CATALOG
}

impl EventKind {
    pub fn descriptor(self) -> &'static EventDescriptor {
        &CATALOG[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

// ============================================================================
// Events
// ============================================================================

/// Payload of `shellHashChanged`.
///
/// `*_app_specific_hash` carry the route without its delimiter,
/// `*_app_specific_route` the raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellHashChange {
    pub new_shell_hash: Option<String>,
    pub new_app_specific_hash: Option<String>,
    pub new_app_specific_route: Option<String>,
    pub old_shell_hash: Option<String>,
    pub old_app_specific_hash: Option<String>,
    pub old_app_specific_route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<GrammarError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum NavigationEvent {
    #[serde(rename = "hashSet")]
    HashSet {
        #[serde(rename = "sHash")]
        hash: String,
    },
    #[serde(rename = "hashReplaced")]
    HashReplaced {
        #[serde(rename = "sHash")]
        hash: String,
    },
    /// Inner-app navigation.
    #[serde(rename = "hashChanged", rename_all = "camelCase")]
    HashChanged {
        new_hash: Option<String>,
        old_hash: Option<String>,
    },
    /// Content update that is not a navigation.
    #[serde(rename = "hashUpdated", rename_all = "camelCase")]
    HashUpdated {
        new_hash: Option<String>,
        old_hash: Option<String>,
    },
    #[serde(rename = "shellHashChanged")]
    ShellHashChanged(ShellHashChange),
    #[serde(rename = "shellHashParamChanged", rename_all = "camelCase")]
    ShellHashParamChanged {
        new_parameters: Params,
        old_parameters: Params,
    },
}

impl NavigationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            NavigationEvent::HashSet { .. } => EventKind::HashSet,
            NavigationEvent::HashReplaced { .. } => EventKind::HashReplaced,
            NavigationEvent::HashChanged { .. } => EventKind::HashChanged,
            NavigationEvent::HashUpdated { .. } => EventKind::HashUpdated,
            NavigationEvent::ShellHashChanged(_) => EventKind::ShellHashChanged,
            NavigationEvent::ShellHashParamChanged { .. } => EventKind::ShellHashParamChanged,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

pub type Listener = Rc<dyn Fn(&NavigationEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Event name → ordered listeners.
///
/// `on`/`off` may be called from inside a listener; `emit` works on a
/// snapshot so such changes take effect from the next emission.
#[derive(Default)]
pub struct EventRegistry {
    listeners: RefCell<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
    next_id: Cell<u64>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push((id, listener));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        for list in listeners.values_mut() {
            if let Some(pos) = list.iter().position(|(lid, _)| *lid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.listeners
            .borrow()
            .get(&kind)
            .is_some_and(|list| !list.is_empty())
    }

    /// Delivers `event` and returns the history policy the catalog assigns to it.
    pub fn emit(&self, event: &NavigationEvent) -> HistoryPolicy {
        let descriptor = event.kind().descriptor();
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .get(&descriptor.kind)
            .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();

        debug!(
            "Emitting {} to {} listener(s), history: {:?}",
            descriptor.name,
            snapshot.len(),
            descriptor.history_policy()
        );
        for listener in snapshot {
            listener(event);
        }
        descriptor.history_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_follows_kind_order() {
        for (idx, descriptor) in catalog().iter().enumerate() {
            assert_eq!(descriptor.kind as usize, idx);
            assert_eq!(descriptor.kind.descriptor().name, descriptor.name);
        }
    }

    #[test]
    fn test_only_param_change_defers_history() {
        let deferred: Vec<_> = catalog()
            .iter()
            .filter(|d| d.creates_history_entry.is_none())
            .map(|d| d.name)
            .collect();
        assert_eq!(deferred, vec!["shellHashParamChanged"]);
        assert_eq!(EventKind::HashSet.descriptor().history_policy(), HistoryPolicy::Push);
        assert_eq!(EventKind::HashReplaced.descriptor().history_policy(), HistoryPolicy::Replace);
    }

    #[test]
    fn test_event_serializes_with_catalog_names() {
        let event = NavigationEvent::HashChanged {
            new_hash: Some("r2".into()),
            old_hash: Some("r1".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "hashChanged");
        assert_eq!(json["newHash"], "r2");
        assert_eq!(json["oldHash"], "r1");

        let set = serde_json::to_value(NavigationEvent::HashSet { hash: "A-b".into() }).unwrap();
        assert_eq!(set["sHash"], "A-b");
    }

    #[test]
    fn test_emit_reaches_listeners_of_kind_only() {
        let registry = EventRegistry::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        registry.on(
            EventKind::HashSet,
            Rc::new(move |e: &NavigationEvent| sink.borrow_mut().push(e.clone())),
        );

        let policy = registry.emit(&NavigationEvent::HashSet { hash: "A-b".into() });
        registry.emit(&NavigationEvent::HashReplaced { hash: "A-b".into() });

        assert_eq!(policy, HistoryPolicy::Push);
        assert_eq!(seen.borrow().len(), 1);
        assert!(registry.has_listeners(EventKind::HashSet));
        assert!(!registry.has_listeners(EventKind::HashReplaced));
    }

    #[test]
    fn test_off_inside_listener_uses_snapshot() {
        let registry = Rc::new(RegistryHolder::default());
        let calls = Rc::new(Cell::new(0));

        let (holder, counter) = (registry.clone(), calls.clone());
        let first = registry.inner.on(
            EventKind::HashUpdated,
            Rc::new(move |_: &NavigationEvent| {
                counter.set(counter.get() + 1);
                if let Some(id) = holder.second.get() {
                    holder.inner.off(id);
                }
            }),
        );
        let counter = calls.clone();
        let second = registry.inner.on(
            EventKind::HashUpdated,
            Rc::new(move |_: &NavigationEvent| counter.set(counter.get() + 1)),
        );
        registry.second.set(Some(second));

        let event = NavigationEvent::HashUpdated { new_hash: None, old_hash: None };
        registry.inner.emit(&event);
        assert_eq!(calls.get(), 2);

        registry.inner.emit(&event);
        assert_eq!(calls.get(), 3);
        assert!(registry.inner.off(first));
        assert!(!registry.inner.off(second));
    }

    #[derive(Default)]
    struct RegistryHolder {
        inner: EventRegistry,
        second: Cell<Option<ListenerId>>,
    }
}
