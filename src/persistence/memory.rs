//! In-process key/value store.
//!
//! Keeps every saved entry in a map; transient and persistent entries are
//! only distinguished for inspection. Useful for tests and the CLI driver.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use log::debug;

use crate::persistence::{AppStateKey, KeyValueStore, PersistenceError};

#[derive(Debug, Clone)]
struct StoredEntry {
    data: String,
    transient: bool,
    scope: Option<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` was saved as a transient entry.
    pub fn is_transient(&self, key: &str) -> Option<bool> {
        self.entries
            .lock()
            .ok()
            .and_then(|e| e.get(key).map(|entry| entry.transient))
    }

    pub fn scope_of(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|e| e.get(key).and_then(|entry| entry.scope.clone()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn create_key(&self, scope: Option<&str>, transient: bool) -> AppStateKey {
        let key = format!("AS{}", uuid::Uuid::new_v4().simple()).to_uppercase();
        AppStateKey::new(key, scope, transient)
    }

    async fn save(&self, entry: &AppStateKey) -> Result<(), PersistenceError> {
        let data = entry
            .data()
            .ok_or_else(|| PersistenceError::Malformed(format!("no data set on key {}", entry.key())))?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| PersistenceError::Store(e.to_string()))?;
        entries.insert(
            entry.key().to_string(),
            StoredEntry {
                data: data.to_string(),
                transient: entry.transient,
                scope: entry.scope.clone(),
            },
        );
        debug!("Saved {} bytes under {}", data.len(), entry.key());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| PersistenceError::Store(e.to_string()))?;
        Ok(entries.get(key).map(|entry| entry.data.clone()))
    }

    fn peek(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|e| e.get(key).map(|entry| entry.data.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryStore::new();
        let mut entry = store.create_key(Some("app"), true);
        entry.set_data("A-b?x=1".into());
        store.save(&entry).await.unwrap();

        assert_eq!(store.load(entry.key()).await.unwrap().as_deref(), Some("A-b?x=1"));
        assert_eq!(store.peek(entry.key()).as_deref(), Some("A-b?x=1"));
        assert_eq!(store.is_transient(entry.key()), Some(true));
        assert_eq!(store.scope_of(entry.key()).as_deref(), Some("app"));
    }

    #[tokio::test]
    async fn test_save_without_data_is_rejected() {
        let store = MemoryStore::new();
        let entry = store.create_key(None, false);
        let err = store.save(&entry).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Malformed(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_keys_are_unique() {
        let store = MemoryStore::new();
        let a = store.create_key(None, false);
        let b = store.create_key(None, false);
        assert_ne!(a.key(), b.key());
        assert!(a.key().starts_with("AS"));
    }
}
