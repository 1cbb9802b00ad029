//! # Shell Navigation
//!
//! Owns "where the application currently is". Fragment-change notifications
//! from the [`Location`] are classified and turned into [`NavigationEvent`]s;
//! writes from collaborators go through one primitive that announces the
//! change before performing it.
//!
//! ```text
//! Location ──(new, old)──▶ handle_hash_change
//!                            │ suppressed?  ─────────────────────▶ Suppressed
//!                            │ busy?        ─────────────────────▶ Queued
//!                            ▼
//!                         expand ─▶ parse ─▶ filters ─▶ compare ─▶ emit
//!                                     │         │
//!                                     │         ├─ Abandon ─▶ revert location
//!                                     │         ├─ Custom  ─▶ replace location
//!                                     │         └─ Keep    ─▶ hashUpdated
//!                                     └─ grammar error ─▶ shellHashChanged{error}
//! ```
//!
//! Single-threaded: shared pieces live in `Rc`/`RefCell`, and no borrow is
//! held while foreign code (filters, listeners, callback, location) runs, so
//! that code may call back into the router.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, VecDeque};
use std::error::Error;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::core::compaction::{CompactedParams, CompactionConfig, Compactor};
use crate::core::config::DEFAULT_TECHNICAL_PARAMETERS;
use crate::core::events::{
    EventKind, EventRegistry, HistoryPolicy, Listener, ListenerId, NavigationEvent,
    ShellHashChange,
};
use crate::core::filter::{FilterChain, FilterVerdict, NavigationFilter};
use crate::core::hash::{self, GrammarError, Params, StructuredHash};
use crate::core::state::{Classification, NavigationState};
use crate::location::Location;
use crate::persistence::{KeyValueStore, PersistenceError};

/// Invoked on every shell change (and grammar error) with the full payload.
pub type ShellCallback = Rc<dyn Fn(&ShellHashChange) -> Result<(), Box<dyn Error>>>;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Parameters ignored when comparing parameter sets.
    pub technical_parameters: BTreeSet<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            technical_parameters: DEFAULT_TECHNICAL_PARAMETERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// ============================================================================
// Re-entrancy guard
// ============================================================================

/// Scoped suppression of recursive dispatch.
///
/// While a [`SuppressionScope`] is alive, notifications are dropped. Forced
/// location writes (filter `Abandon`/`Custom`) run inside one, because the
/// location reports them back synchronously.
#[derive(Default)]
struct DispatchSuppression {
    active: Cell<bool>,
}

struct SuppressionScope<'a> {
    owner: &'a DispatchSuppression,
    previous: bool,
}

impl DispatchSuppression {
    fn enter(&self) -> SuppressionScope<'_> {
        SuppressionScope {
            owner: self,
            previous: self.active.replace(true),
        }
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl Drop for SuppressionScope<'_> {
    fn drop(&mut self) {
        self.owner.active.set(self.previous);
    }
}

/// Marks the router busy for one dispatch. Dropping it (also while
/// unwinding out of foreign code) returns the router to idle.
struct DispatchScope<'a> {
    router: &'a ShellNavigation,
}

impl<'a> DispatchScope<'a> {
    fn enter(router: &'a ShellNavigation) -> Self {
        router.dispatching.set(true);
        Self { router }
    }
}

impl Drop for DispatchScope<'_> {
    fn drop(&mut self) {
        self.router.dispatching.set(false);
        if let Ok(mut pending) = self.router.pending.try_borrow_mut() {
            if !pending.is_empty() {
                warn!("Dropping {} queued notification(s) after an aborted dispatch", pending.len());
                pending.clear();
            }
        }
        if let Ok(mut state) = self.router.state.try_borrow_mut() {
            state.finish();
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub struct ShellNavigation {
    location: Rc<dyn Location>,
    compactor: Compactor,
    config: RouterConfig,
    filters: FilterChain,
    events: EventRegistry,
    state: RefCell<NavigationState>,
    shell_callback: RefCell<Option<ShellCallback>>,
    suppression: DispatchSuppression,
    dispatching: Cell<bool>,
    pending: RefCell<VecDeque<(String, String)>>,
    compared_once: Cell<bool>,
    reload_requested: Cell<bool>,
    initialized: Cell<bool>,
}

impl ShellNavigation {
    pub fn new(
        location: Rc<dyn Location>,
        store: Arc<dyn KeyValueStore>,
        config: RouterConfig,
        compaction: CompactionConfig,
    ) -> Rc<Self> {
        Rc::new(Self {
            location,
            compactor: Compactor::new(store, compaction),
            config,
            filters: FilterChain::new(),
            events: EventRegistry::new(),
            state: RefCell::new(NavigationState::default()),
            shell_callback: RefCell::new(None),
            suppression: DispatchSuppression::default(),
            dispatching: Cell::new(false),
            pending: RefCell::new(VecDeque::new()),
            compared_once: Cell::new(false),
            reload_requested: Cell::new(false),
            initialized: Cell::new(false),
        })
    }

    /// Subscribes to the location and classifies the current fragment as the
    /// first navigation. Returns `None` if the router was already initialized.
    pub fn init(self: &Rc<Self>, shell_callback: ShellCallback) -> Option<Classification> {
        *self.shell_callback.borrow_mut() = Some(shell_callback);
        if self.initialized.replace(true) {
            warn!("Router already initialized, only the shell callback was replaced");
            return None;
        }

        let weak = Rc::downgrade(self);
        self.location.on_change(Box::new(move |new: &str, old: &str| {
            if let Some(router) = weak.upgrade() {
                router.handle_hash_change(new, old);
            }
        }));
        info!("Router listening on {} location", self.location.name());

        let current = self.location.fragment();
        Some(self.handle_hash_change(&current, ""))
    }

    // ── Subscriptions ───────────────────────────────────────────────────────

    pub fn register_filter(&self, filter: Rc<dyn NavigationFilter>) {
        self.filters.register(filter);
    }

    pub fn unregister_filter(&self, filter: &Rc<dyn NavigationFilter>) {
        self.filters.unregister(filter);
    }

    pub fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.events.on(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    // ── Introspection ───────────────────────────────────────────────────────

    pub fn navigation_state(&self) -> NavigationState {
        self.state.borrow().clone()
    }

    pub fn is_navigating(&self) -> bool {
        self.state.borrow().in_progress()
    }

    pub fn current_fragment(&self) -> String {
        self.location.fragment()
    }

    pub fn compactor(&self) -> &Compactor {
        &self.compactor
    }

    /// The next inner-app navigation is handled as a shell change instead.
    pub fn reload_current_app(&self) {
        self.reload_requested.set(true);
    }

    // ── Classification ──────────────────────────────────────────────────────

    /// Entry point for fragment-change notifications.
    pub fn handle_hash_change(&self, new_raw: &str, old_raw: &str) -> Classification {
        let new_fragment = hash::strip_leading_marker(new_raw);
        let old_fragment = hash::strip_leading_marker(old_raw);

        if self.suppression.is_active() {
            let mut state = self.state.borrow_mut();
            state.start(new_fragment, old_fragment);
            state.finish();
            debug!("Suppressed notification '{old_fragment}' -> '{new_fragment}'");
            return Classification::Suppressed;
        }

        if self.dispatching.get() {
            debug!("Queued notification '{old_fragment}' -> '{new_fragment}'");
            self.pending
                .borrow_mut()
                .push_back((new_fragment.to_string(), old_fragment.to_string()));
            return Classification::Queued;
        }

        let _scope = DispatchScope::enter(self);
        let classification = self.classify(new_fragment, old_fragment);
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some((new, old)) = next else { break };
            self.classify(&new, &old);
        }
        classification
    }

    fn classify(&self, new_fragment: &str, old_fragment: &str) -> Classification {
        self.state.borrow_mut().start(new_fragment, old_fragment);
        let classification = self.run_classification(new_fragment, old_fragment);
        self.state.borrow_mut().finish();
        debug!("'{old_fragment}' -> '{new_fragment}' classified as {classification:?}");
        classification
    }

    fn run_classification(&self, new_fragment: &str, old_fragment: &str) -> Classification {
        let new_expanded = self.compactor.expand_cached(new_fragment);
        let old_expanded = self.compactor.expand_cached(old_fragment);

        // Old malformed state must never block forward navigation.
        let old_hash = hash::parse(&old_expanded).unwrap_or_else(|e| {
            debug!("Old fragment treated as unstructured: {e}");
            StructuredHash::unstructured(old_fragment)
        });
        let new_hash = match hash::parse(&new_expanded) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.report_grammar_error(new_fragment, &old_hash, e);
                return Classification::Error;
            }
        };

        match self.filters.evaluate(new_fragment, old_fragment) {
            FilterVerdict::Continue => {}
            FilterVerdict::Abandon => {
                self.force_location(old_fragment);
                return Classification::Abandoned;
            }
            FilterVerdict::Custom(Some(target)) => {
                self.force_location(&target);
                return Classification::Custom;
            }
            FilterVerdict::Custom(None) => return Classification::Custom,
            FilterVerdict::Keep => {
                self.events.emit(&NavigationEvent::HashUpdated {
                    new_hash: new_hash.app_route_stripped(),
                    old_hash: old_hash.app_route_stripped(),
                });
                return Classification::Kept;
            }
        }

        let first = !self.compared_once.replace(true);
        let same_intent = !first && new_hash.intent == old_hash.intent;
        let same_params = self.relevant_params(&new_hash) == self.relevant_params(&old_hash);
        let same_app_route = new_hash.app_specific_route == old_hash.app_specific_route;
        let reload = self.reload_requested.replace(false);
        debug!(
            "same_intent={same_intent} same_params={same_params} same_app_route={same_app_route} reload={reload}"
        );

        if same_intent && same_params && same_app_route {
            self.events.emit(&NavigationEvent::HashUpdated {
                new_hash: new_hash.app_route_stripped(),
                old_hash: old_hash.app_route_stripped(),
            });
            return Classification::SameHash;
        }

        if same_intent && same_params && !reload {
            self.events.emit(&NavigationEvent::HashChanged {
                new_hash: new_hash.app_route_stripped(),
                old_hash: old_hash.app_route_stripped(),
            });
            return Classification::InnerApp;
        }

        if same_intent
            && !same_params
            && self.events.has_listeners(EventKind::ShellHashParamChanged)
        {
            self.events.emit(&NavigationEvent::ShellHashParamChanged {
                new_parameters: new_hash.params_or_empty(),
                old_parameters: old_hash.params_or_empty(),
            });
            return Classification::ParamOnly;
        }

        let change = ShellHashChange {
            new_shell_hash: new_hash.shell_part.clone(),
            new_app_specific_hash: new_hash.app_route_stripped(),
            new_app_specific_route: new_hash.app_specific_route.clone(),
            old_shell_hash: old_hash.shell_part.clone(),
            old_app_specific_hash: old_hash.app_route_stripped(),
            old_app_specific_route: old_hash.app_specific_route.clone(),
            error: None,
        };
        self.events.emit(&NavigationEvent::ShellHashChanged(change.clone()));
        self.invoke_shell_callback(&change);
        Classification::ShellChange
    }

    fn relevant_params(&self, hash: &StructuredHash) -> Params {
        let mut params = hash.params_or_empty();
        params.retain(|name, _| !self.config.technical_parameters.contains(name));
        params
    }

    fn report_grammar_error(&self, new_fragment: &str, old_hash: &StructuredHash, error: GrammarError) {
        warn!("Navigation to unparsable fragment: {error}");
        let change = ShellHashChange {
            new_shell_hash: Some(new_fragment.to_string()),
            old_shell_hash: old_hash.shell_part.clone(),
            old_app_specific_hash: old_hash.app_route_stripped(),
            old_app_specific_route: old_hash.app_specific_route.clone(),
            error: Some(error),
            ..Default::default()
        };
        self.events.emit(&NavigationEvent::ShellHashChanged(change.clone()));
        self.invoke_shell_callback(&change);
    }

    fn invoke_shell_callback(&self, change: &ShellHashChange) {
        let callback = self.shell_callback.borrow().clone();
        if let Some(callback) = callback {
            if let Err(e) = callback(change) {
                warn!("Shell callback failed: {e}");
            }
        }
    }

    /// Replaces the location without classifying the resulting notification.
    fn force_location(&self, fragment: &str) {
        let _scope = self.suppression.enter();
        debug!("Forcing location to '{fragment}'");
        self.location.replace_fragment(hash::strip_leading_marker(fragment));
    }

    // ── Writes ──────────────────────────────────────────────────────────────

    /// Sets the app-specific route of the current fragment, adding a history entry.
    pub fn set_hash(&self, app_route: &str) {
        self.write_location(None, Some(app_route), true);
    }

    /// Like [`set_hash`](Self::set_hash) but replaces the current history entry.
    pub fn replace_hash(&self, app_route: &str) {
        self.write_location(None, Some(app_route), false);
    }

    pub fn to_app_hash(&self, app_route: &str, push: bool) {
        self.write_location(None, Some(app_route), push);
    }

    /// Navigates to another shell part, optionally with an app-specific route.
    pub fn to_external(&self, shell_part: &str, app_route: Option<&str>, push: bool) {
        self.write_location(Some(shell_part), app_route, push);
    }

    /// Compacts the target's parameters, then navigates to it.
    ///
    /// Nothing is written if the store fails.
    pub async fn to_external_compacted(
        &self,
        target: &StructuredHash,
        retain: &[String],
        push: bool,
    ) -> Result<CompactedParams, PersistenceError> {
        let compacted = self
            .compact_params(&target.params_or_empty(), retain, None, false)
            .await?;
        let shell = hash::construct(
            &target
                .clone()
                .with_params(compacted.params.clone())
                .with_app_route(None),
        );
        self.write_location(Some(&shell), target.app_specific_route.as_deref(), push);
        Ok(compacted)
    }

    pub async fn compact_params(
        &self,
        params: &Params,
        retain: &[String],
        scope: Option<&str>,
        transient: bool,
    ) -> Result<CompactedParams, PersistenceError> {
        self.compactor.compact(params, retain, scope, transient).await
    }

    /// The single write path. Listeners see `hashSet`/`hashReplaced` before
    /// the location changes.
    fn write_location(&self, shell_part: Option<&str>, app_route: Option<&str>, push: bool) {
        let current = self.location.fragment();
        let (current_shell, _) = hash::split_app_route(&current);
        let shell = shell_part
            .map(hash::strip_leading_marker)
            .unwrap_or(current_shell);
        let fragment = hash::join_app_route(shell, app_route);

        let event = if push {
            NavigationEvent::HashSet { hash: fragment.clone() }
        } else {
            NavigationEvent::HashReplaced { hash: fragment.clone() }
        };
        let push = match self.events.emit(&event) {
            HistoryPolicy::Push => true,
            HistoryPolicy::Replace => false,
            // Only shellHashParamChanged defers, and it is never emitted here.
            HistoryPolicy::Deferred => push,
        };
        if push {
            self.location.set_fragment(&fragment);
        } else {
            self.location.replace_fragment(&fragment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};

    use crate::core::filter::FilterError;
    use crate::core::state::NavigationStatus;
    use crate::test_support::{EventLog, test_router};

    #[test]
    fn test_init_classifies_current_fragment_as_shell_change() {
        let (router, location, calls) = test_router("A-b");
        let log = EventLog::attach(&router);

        let result = router.init(calls.callback());
        assert_eq!(result, Some(Classification::ShellChange));
        assert_eq!(log.names(), vec!["shellHashChanged"]);
        assert_eq!(calls.shell_hashes(), vec![Some("A-b".to_string())]);
        assert_eq!(location.fragment(), "A-b");
        assert!(router.init(calls.callback()).is_none());
    }

    #[test]
    fn test_first_classification_of_identical_fragments_is_not_same_hash() {
        let (router, _, _) = test_router("");
        assert_eq!(router.handle_hash_change("A-b", "A-b"), Classification::ShellChange);
        assert_eq!(router.handle_hash_change("A-b", "A-b"), Classification::SameHash);
    }

    #[test]
    fn test_technical_params_do_not_count() {
        let (router, _, _) = test_router("");
        router.handle_hash_change("A-b", "");
        let log = EventLog::attach(&router);

        let result = router.handle_hash_change("A-b?sap-ui-debug=true", "A-b");
        assert_eq!(result, Classification::SameHash);
        assert_eq!(log.names(), vec!["hashUpdated"]);
    }

    #[test]
    fn test_param_change_without_listener_is_shell_change() {
        let (router, _, _) = test_router("");
        router.handle_hash_change("A-b", "");
        assert_eq!(
            router.handle_hash_change("A-b?x=1", "A-b"),
            Classification::ShellChange
        );
    }

    #[test]
    fn test_reload_turns_inner_navigation_into_shell_change_once() {
        let (router, _, _) = test_router("");
        router.handle_hash_change("A-b&/r1", "");
        router.reload_current_app();

        assert_eq!(
            router.handle_hash_change("A-b&/r2", "A-b&/r1"),
            Classification::ShellChange
        );
        assert_eq!(
            router.handle_hash_change("A-b&/r3", "A-b&/r2"),
            Classification::InnerApp
        );
    }

    #[test]
    fn test_malformed_old_fragment_does_not_block() {
        let (router, _, calls) = test_router("");
        router.init(calls.callback());
        let result = router.handle_hash_change("C-d", "not a hash");
        assert_eq!(result, Classification::ShellChange);
        assert_eq!(
            calls.old_shell_hashes().last().cloned().flatten().as_deref(),
            Some("not a hash")
        );
    }

    #[test]
    fn test_state_is_finished_after_every_path() {
        let (router, _, _) = test_router("");
        for (new, old) in [("A-b", ""), ("A-", "A-b"), ("A-b&/x", "A-b")] {
            router.handle_hash_change(new, old);
            let state = router.navigation_state();
            assert_eq!(state.status, NavigationStatus::Finished);
            assert_eq!(state.new_hash.as_deref(), Some(new));
        }
    }

    #[test]
    fn test_panicking_filter_leaves_router_idle() {
        let (router, _, _) = test_router("");
        router.handle_hash_change("A-b", "");
        router.register_filter(Rc::new(
            |new: &str, _old: &str| -> Result<FilterVerdict, FilterError> {
                if new == "X-y" {
                    panic!("filter blew up");
                }
                Ok(FilterVerdict::Continue)
            },
        ));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            router.handle_hash_change("X-y", "A-b")
        }));
        assert!(outcome.is_err());
        assert!(!router.is_navigating());
        assert_eq!(router.navigation_state().status, NavigationStatus::Finished);

        assert_eq!(
            router.handle_hash_change("C-d", "A-b"),
            Classification::ShellChange
        );
    }

    #[test]
    fn test_suppression_scope_restores_previous_value() {
        let suppression = DispatchSuppression::default();
        {
            let _outer = suppression.enter();
            {
                let _inner = suppression.enter();
                assert!(suppression.is_active());
            }
            assert!(suppression.is_active());
        }
        assert!(!suppression.is_active());
    }

    #[test]
    fn test_write_location_fires_event_before_write() {
        let (router, location, _) = test_router("A-b");
        let seen_fragment = Rc::new(RefCell::new(None));
        let (sink, loc) = (seen_fragment.clone(), location.clone());
        router.on(
            EventKind::HashSet,
            Rc::new(move |_: &NavigationEvent| *sink.borrow_mut() = Some(loc.fragment())),
        );

        router.set_hash("detail/1");
        assert_eq!(seen_fragment.borrow().as_deref(), Some("A-b"));
        assert_eq!(location.fragment(), "A-b&/detail/1");

        router.replace_hash("detail/2");
        assert_eq!(location.history(), vec!["A-b", "A-b&/detail/2"]);
    }

    #[test]
    fn test_write_history_follows_fired_event() {
        let (router, location, _) = test_router("A-b");
        let log = EventLog::attach(&router);

        router.to_external("C-d", None, true);
        router.to_external("#E-f", Some("item/3"), false);

        assert_eq!(log.names(), vec!["hashSet", "hashReplaced"]);
        assert_eq!(location.history(), vec!["A-b", "E-f&/item/3"]);
    }
}
