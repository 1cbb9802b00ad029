//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::compaction::CompactionConfig;
use crate::core::events::{EventKind, NavigationEvent, ShellHashChange, catalog};
use crate::core::router::{RouterConfig, ShellCallback, ShellNavigation};
use crate::location::MemoryLocation;
use crate::persistence::{AppStateKey, KeyValueStore, MemoryStore, PersistenceError};

/// A store whose writes always fail.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    fn create_key(&self, scope: Option<&str>, transient: bool) -> AppStateKey {
        AppStateKey::new("FAILING".to_string(), scope, transient)
    }

    async fn save(&self, _entry: &AppStateKey) -> Result<(), PersistenceError> {
        Err(PersistenceError::Store("disk full".into()))
    }

    async fn load(&self, _key: &str) -> Result<Option<String>, PersistenceError> {
        Err(PersistenceError::Store("disk full".into()))
    }

    fn peek(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Records every event of every catalog kind, including
/// `shellHashParamChanged` (so attaching one enables `ParamOnly`).
pub struct EventLog {
    events: Rc<RefCell<Vec<NavigationEvent>>>,
}

impl EventLog {
    pub fn attach(router: &ShellNavigation) -> Self {
        let events = Rc::new(RefCell::new(Vec::new()));
        for descriptor in catalog() {
            let sink = events.clone();
            router.on(
                descriptor.kind,
                Rc::new(move |e: &NavigationEvent| sink.borrow_mut().push(e.clone())),
            );
        }
        Self { events }
    }

    pub fn events(&self) -> Vec<NavigationEvent> {
        self.events.borrow().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.borrow().iter().map(|e| e.kind().name()).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.borrow().iter().filter(|e| e.kind() == kind).count()
    }
}

/// Records shell callback invocations.
#[derive(Clone, Default)]
pub struct ShellCalls {
    calls: Rc<RefCell<Vec<ShellHashChange>>>,
}

impl ShellCalls {
    pub fn callback(&self) -> ShellCallback {
        let sink = self.calls.clone();
        Rc::new(move |change: &ShellHashChange| -> Result<(), Box<dyn std::error::Error>> {
            sink.borrow_mut().push(change.clone());
            Ok(())
        })
    }

    pub fn all(&self) -> Vec<ShellHashChange> {
        self.calls.borrow().clone()
    }

    pub fn shell_hashes(&self) -> Vec<Option<String>> {
        self.calls.borrow().iter().map(|c| c.new_shell_hash.clone()).collect()
    }

    pub fn old_shell_hashes(&self) -> Vec<Option<String>> {
        self.calls.borrow().iter().map(|c| c.old_shell_hash.clone()).collect()
    }
}

/// Creates a router over a fresh in-memory location and store. Not initialized.
pub fn test_router(initial: &str) -> (Rc<ShellNavigation>, Rc<MemoryLocation>, ShellCalls) {
    let location = Rc::new(MemoryLocation::new(initial));
    let router = ShellNavigation::new(
        location.clone(),
        Arc::new(MemoryStore::new()),
        RouterConfig::default(),
        CompactionConfig::default(),
    );
    (router, location, ShellCalls::default())
}
