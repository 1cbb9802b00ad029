use std::fmt;

use async_trait::async_trait;

/// Errors that can occur while talking to a key/value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// The store rejected or failed the operation.
    Store(String),
    /// No data was saved under the key.
    NotFound(String),
    /// Data was found but is not what the caller expected.
    Malformed(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Store(msg) => write!(f, "store error: {msg}"),
            PersistenceError::NotFound(key) => write!(f, "no data stored under key {key}"),
            PersistenceError::Malformed(msg) => write!(f, "malformed stored data: {msg}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

/// A freshly created key that data can be attached to before saving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppStateKey {
    key: String,
    data: Option<String>,
    /// Transient entries only live as long as the store instance.
    pub transient: bool,
    /// Optional owner scope, e.g. the component requesting compaction.
    pub scope: Option<String>,
}

impl AppStateKey {
    pub fn new(key: String, scope: Option<&str>, transient: bool) -> Self {
        Self {
            key,
            data: None,
            transient,
            scope: scope.map(str::to_string),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    pub fn set_data(&mut self, data: String) {
        self.data = Some(data);
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the name of the store.
    fn name(&self) -> &str;

    /// Hands out a new, unused key. Never reuses keys.
    fn create_key(&self, scope: Option<&str>, transient: bool) -> AppStateKey;

    /// Persists the entry's data. Resolves once the store acknowledged the write.
    async fn save(&self, entry: &AppStateKey) -> Result<(), PersistenceError>;

    /// Loads data saved under `key`.
    async fn load(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Synchronous best-effort lookup of data already available locally.
    fn peek(&self, key: &str) -> Option<String>;
}
