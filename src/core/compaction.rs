//! # Parameter Compaction
//!
//! Shrinks an oversized parameter set into a short reference key stored in a
//! [`KeyValueStore`], and expands such references back.
//!
//! ```text
//! compact({a, b, sap-system}, retain=[a])
//!     store[KEY] = "Shell-compact?b=…"
//!     → inline {a, sap-system, sap-intent-param=KEY}
//!
//! expand("A-b?a=1&sap-intent-param=KEY&/route")
//!     → "A-b?a=1&b=…&/route"
//! ```
//!
//! Compaction is asynchronous and independent of the classifier: callers
//! building an outbound link await it before writing the location. The
//! classifier only uses [`Compactor::expand_cached`], which never waits.
//! Failed writes are not rolled back, and every call uses a fresh key.

use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;

use crate::core::config::{
    DEFAULT_COMPACTION_THRESHOLD, DEFAULT_REFERENCE_PARAMETER, DEFAULT_RETAINED_PARAMETERS,
};
use crate::core::hash::{self, Params, StructuredHash};
use crate::persistence::{KeyValueStore, PersistenceError};

/// Target of the temporary hash whose parameters are stored.
const STORAGE_SEMANTIC_OBJECT: &str = "Shell";
const STORAGE_ACTION: &str = "compact";

#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Kept inline on every call, on top of the per-call retain list.
    pub retained_parameters: Vec<String>,
    /// Hashes shorter than this are left alone.
    pub threshold: usize,
    /// Inline parameter carrying the generated key.
    pub reference_parameter: String,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            retained_parameters: DEFAULT_RETAINED_PARAMETERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            threshold: DEFAULT_COMPACTION_THRESHOLD,
            reference_parameter: DEFAULT_REFERENCE_PARAMETER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactedParams {
    /// Parameters to put in the link: retained ones plus the reference, if any.
    pub params: Params,
    /// Shell part built from `params`, usable as-is.
    pub hash: String,
    /// Key the excess parameters were stored under.
    pub key: Option<String>,
    /// Names of the parameters moved into the store.
    pub skipped_params: Vec<String>,
}

impl CompactedParams {
    fn unchanged(params: &Params) -> Self {
        Self {
            params: params.clone(),
            hash: hash::construct(&storage_hash(params.clone())),
            key: None,
            skipped_params: Vec::new(),
        }
    }
}

pub struct Compactor {
    store: Arc<dyn KeyValueStore>,
    config: CompactionConfig,
}

impl Compactor {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CompactionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// Moves every parameter not in `retain` (or the configured retained set)
    /// into the store and returns what should stay inline.
    ///
    /// An empty `params` resolves immediately without touching the store.
    pub async fn compact(
        &self,
        params: &Params,
        retain: &[String],
        scope: Option<&str>,
        transient: bool,
    ) -> Result<CompactedParams, PersistenceError> {
        if params.is_empty() {
            return Ok(CompactedParams::unchanged(params));
        }

        let full = hash::construct(&storage_hash(params.clone()));
        if full.len() < self.config.threshold {
            debug!(
                "Hash of {} chars is below the compaction threshold {}",
                full.len(),
                self.config.threshold
            );
            return Ok(CompactedParams::unchanged(params));
        }

        let (mut inline, excess): (Params, Params) = params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .partition(|(name, _)| self.is_retained(name, retain));
        if excess.is_empty() {
            return Ok(CompactedParams::unchanged(params));
        }

        let mut entry = self.store.create_key(scope, transient);
        entry.set_data(hash::construct(&storage_hash(excess.clone())));
        if let Err(e) = self.store.save(&entry).await {
            warn!(
                "Compaction of {} parameter(s) into {} failed: {e}",
                excess.len(),
                self.store.name()
            );
            return Err(e);
        }
        debug!("Compacted {} parameter(s) under {}", excess.len(), entry.key());

        inline.insert(self.config.reference_parameter.clone(), entry.key().to_string());
        Ok(CompactedParams {
            hash: hash::construct(&storage_hash(inline.clone())),
            params: inline,
            key: Some(entry.key().to_string()),
            skipped_params: excess.into_keys().collect(),
        })
    }

    /// Resolves a reference key in `fragment` through the store.
    ///
    /// Fragments without a reference come back unchanged (without marker).
    pub async fn expand(&self, fragment: &str) -> Result<String, PersistenceError> {
        let Some((parsed, key)) = self.reference_of(fragment) else {
            return Ok(hash::strip_leading_marker(fragment).to_string());
        };
        let data = self
            .store
            .load(&key)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(key.clone()))?;
        self.merge(parsed, &data)
    }

    /// Best-effort synchronous [`expand`](Self::expand): uses only data the
    /// store already holds locally and leaves the fragment untouched otherwise.
    pub fn expand_cached(&self, fragment: &str) -> String {
        let unchanged = || hash::strip_leading_marker(fragment).to_string();
        let Some((parsed, key)) = self.reference_of(fragment) else {
            return unchanged();
        };
        match self.store.peek(&key) {
            Some(data) => self.merge(parsed, &data).unwrap_or_else(|e| {
                warn!("Cannot expand {key}: {e}");
                unchanged()
            }),
            None => {
                debug!("Reference {key} not available locally, leaving it unresolved");
                unchanged()
            }
        }
    }

    fn is_retained(&self, name: &str, retain: &[String]) -> bool {
        retain.iter().chain(&self.config.retained_parameters).any(|r| r == name)
    }

    fn reference_of(&self, fragment: &str) -> Option<(StructuredHash, String)> {
        let parsed = hash::parse(fragment).ok()?;
        let key = parsed
            .params
            .as_ref()?
            .get(&self.config.reference_parameter)?
            .clone();
        Some((parsed, key))
    }

    fn merge(&self, parsed: StructuredHash, data: &str) -> Result<String, PersistenceError> {
        let stored = hash::parse(data)
            .map_err(|e| PersistenceError::Malformed(e.to_string()))?
            .params_or_empty();

        let mut merged = stored;
        merged.extend(parsed.params_or_empty());
        merged.remove(&self.config.reference_parameter);
        Ok(hash::construct(&parsed.with_params(merged)))
    }
}

fn storage_hash(params: Params) -> StructuredHash {
    StructuredHash::for_target(STORAGE_SEMANTIC_OBJECT, STORAGE_ACTION).with_params(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::test_support::FailingStore;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn compactor(store: Arc<dyn KeyValueStore>) -> Compactor {
        Compactor::new(store, CompactionConfig::default())
    }

    #[tokio::test]
    async fn test_empty_params_skip_the_store() {
        let compactor = compactor(Arc::new(FailingStore));
        let result = compactor.compact(&Params::new(), &[], None, false).await.unwrap();
        assert!(result.params.is_empty());
        assert!(result.key.is_none());
    }

    #[tokio::test]
    async fn test_compact_keeps_retained_inline() {
        let store = Arc::new(MemoryStore::new());
        let compactor = compactor(store.clone());
        let input = params(&[("a", "1"), ("b", "2"), ("sap-system", "X")]);

        let result = compactor
            .compact(&input, &["a".to_string()], Some("app"), true)
            .await
            .unwrap();

        let key = result.key.clone().unwrap();
        assert_eq!(result.skipped_params, vec!["b".to_string()]);
        assert_eq!(result.params.get("a").map(String::as_str), Some("1"));
        assert_eq!(result.params.get("sap-system").map(String::as_str), Some("X"));
        assert_eq!(result.params.get("sap-intent-param"), Some(&key));
        assert!(!result.params.contains_key("b"));
        assert_eq!(store.is_transient(&key), Some(true));
        assert_eq!(store.scope_of(&key).as_deref(), Some("app"));
    }

    #[tokio::test]
    async fn test_expand_restores_compacted_params() {
        let store = Arc::new(MemoryStore::new());
        let compactor = compactor(store);
        let input = params(&[("a", "1"), ("b", "two words"), ("c", "3")]);

        let compacted = compactor
            .compact(&input, &["a".to_string()], None, false)
            .await
            .unwrap();
        let expanded = compactor.expand(&format!("#{}&/inner", compacted.hash)).await.unwrap();
        let reparsed = hash::parse(&expanded).unwrap();

        assert_eq!(reparsed.params_or_empty(), input);
        assert_eq!(reparsed.app_specific_route.as_deref(), Some("&/inner"));
        assert_eq!(compactor.expand_cached(&compacted.hash), expanded.trim_end_matches("&/inner"));
    }

    #[tokio::test]
    async fn test_store_failure_rejects() {
        let compactor = compactor(Arc::new(FailingStore));
        let err = compactor
            .compact(&params(&[("a", "1")]), &[], None, false)
            .await
            .unwrap_err();
        assert_eq!(err, PersistenceError::Store("disk full".into()));
    }

    #[tokio::test]
    async fn test_below_threshold_is_left_alone() {
        let store = Arc::new(MemoryStore::new());
        let compactor = Compactor::new(
            store.clone(),
            CompactionConfig {
                threshold: 1000,
                ..Default::default()
            },
        );
        let result = compactor.compact(&params(&[("a", "1")]), &[], None, false).await.unwrap();
        assert!(result.key.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_reference() {
        let compactor = compactor(Arc::new(MemoryStore::new()));
        let fragment = "A-b?sap-intent-param=MISSING";
        assert_eq!(compactor.expand_cached(fragment), fragment);
        assert_eq!(
            compactor.expand(fragment).await.unwrap_err(),
            PersistenceError::NotFound("MISSING".into())
        );
    }

    #[test]
    fn test_duplicate_compaction_uses_distinct_keys() {
        let compactor = compactor(Arc::new(MemoryStore::new()));
        let input = params(&[("x", "1")]);
        let (first, second) = tokio_test::block_on(async {
            futures::future::join(
                compactor.compact(&input, &[], None, false),
                compactor.compact(&input, &[], None, false),
            )
            .await
        });
        assert_ne!(first.unwrap().key, second.unwrap().key);
    }
}
