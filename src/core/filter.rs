//! # Navigation Filters
//!
//! External code can intercept a fragment change before it is classified.
//! Filters run in registration order over the `(new, old)` fragment pair and
//! their verdicts fold into one [`FilterVerdict`]:
//!
//! ```text
//! Continue ─┐
//! Keep ─────┼─▶ next filter ─▶ … ─▶ Keep if any filter kept, else Continue
//! Abandon ──┴─▶ stop, return Abandon
//! Custom ─────▶ stop, return Custom
//! ```
//!
//! A filter that returns `Err` is logged and counts as `Continue`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::{debug, warn};
use serde::Serialize;

/// Verdict of a single filter (and of the whole chain).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FilterVerdict {
    /// No opinion.
    Continue,
    /// The filter takes over. With a hash, the location is replaced by it.
    Custom(Option<String>),
    /// Revert the location to the old fragment.
    Abandon,
    /// Treat the change as a content update without navigation.
    Keep,
}

impl FilterVerdict {
    fn short_circuits(&self) -> bool {
        matches!(self, FilterVerdict::Custom(_) | FilterVerdict::Abandon)
    }
}

/// A filter failed to produce a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterError(pub String);

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "navigation filter failed: {}", self.0)
    }
}

impl std::error::Error for FilterError {}

/// Inspects a fragment change. Fragments are passed without their marker.
pub trait NavigationFilter {
    fn check(&self, new_fragment: &str, old_fragment: &str) -> Result<FilterVerdict, FilterError>;
}

impl<F> NavigationFilter for F
where
    F: Fn(&str, &str) -> Result<FilterVerdict, FilterError>,
{
    fn check(&self, new_fragment: &str, old_fragment: &str) -> Result<FilterVerdict, FilterError> {
        self(new_fragment, old_fragment)
    }
}

/// Ordered, mutable list of filters.
///
/// Mutation is allowed from inside a running filter: evaluation iterates over
/// a snapshot taken when it starts.
#[derive(Default)]
pub struct FilterChain {
    filters: RefCell<Vec<Rc<dyn NavigationFilter>>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, filter: Rc<dyn NavigationFilter>) {
        self.filters.borrow_mut().push(filter);
    }

    /// Removes `filter` by identity. Does nothing if it is not registered.
    pub fn unregister(&self, filter: &Rc<dyn NavigationFilter>) {
        let mut filters = self.filters.borrow_mut();
        if let Some(pos) = filters.iter().position(|f| same_filter(f, filter)) {
            filters.remove(pos);
        }
    }

    pub fn len(&self) -> usize {
        self.filters.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.borrow().is_empty()
    }

    /// Runs every filter and folds the verdicts.
    pub fn evaluate(&self, new_fragment: &str, old_fragment: &str) -> FilterVerdict {
        let snapshot: Vec<_> = self.filters.borrow().clone();
        let mut kept = false;

        for (idx, filter) in snapshot.iter().enumerate() {
            let verdict = match filter.check(new_fragment, old_fragment) {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!("Filter #{idx} failed on '{new_fragment}', ignoring it: {e}");
                    FilterVerdict::Continue
                }
            };
            if verdict.short_circuits() {
                debug!("Filter #{idx} short-circuited with {verdict:?}");
                return verdict;
            }
            kept |= verdict == FilterVerdict::Keep;
        }

        if kept {
            FilterVerdict::Keep
        } else {
            FilterVerdict::Continue
        }
    }
}

fn same_filter(a: &Rc<dyn NavigationFilter>, b: &Rc<dyn NavigationFilter>) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units.
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}
