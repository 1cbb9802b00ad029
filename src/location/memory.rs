//! In-memory location with a browser-like history stack.
//!
//! ```text
//! history: [ "", "A-b", "C-d" ]      cursor ─▶ "C-d"
//!   set_fragment("E-f")     → [ "", "A-b", "C-d", "E-f" ]
//!   replace_fragment("E-f") → [ "", "A-b", "E-f" ]
//!   back()                  → cursor ─▶ "A-b"
//! ```
//!
//! Like a browser, writing the fragment that is already current changes
//! nothing and notifies nobody.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::debug;

use crate::core::hash::strip_leading_marker;
use crate::location::{FragmentListener, Location};

pub struct MemoryLocation {
    history: RefCell<Vec<String>>,
    cursor: Cell<usize>,
    listeners: RefCell<Vec<Rc<dyn Fn(&str, &str)>>>,
}

impl Default for MemoryLocation {
    fn default() -> Self {
        Self::new("")
    }
}

impl MemoryLocation {
    pub fn new(initial: &str) -> Self {
        Self {
            history: RefCell::new(vec![strip_leading_marker(initial).to_string()]),
            cursor: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Entries up to and including the current one.
    pub fn history(&self) -> Vec<String> {
        self.history.borrow()[..=self.cursor.get()].to_vec()
    }

    /// Moves one entry back, like the browser's back button.
    /// Returns false when already at the first entry.
    pub fn back(&self) -> bool {
        let cursor = self.cursor.get();
        if cursor == 0 {
            return false;
        }
        let (old, new) = {
            let history = self.history.borrow();
            (history[cursor].clone(), history[cursor - 1].clone())
        };
        self.cursor.set(cursor - 1);
        self.notify(&new, &old);
        true
    }

    fn current(&self) -> String {
        self.history.borrow()[self.cursor.get()].clone()
    }

    fn write(&self, fragment: &str, push: bool) {
        let fragment = strip_leading_marker(fragment).to_string();
        let old = self.current();
        if fragment == old {
            return;
        }
        {
            let mut history = self.history.borrow_mut();
            let cursor = self.cursor.get();
            history.truncate(cursor + 1);
            if push {
                history.push(fragment.clone());
                self.cursor.set(cursor + 1);
            } else {
                history[cursor] = fragment.clone();
            }
        }
        debug!("Location {} '{old}' -> '{fragment}'", if push { "push" } else { "replace" });
        self.notify(&fragment, &old);
    }

    fn notify(&self, new: &str, old: &str) {
        let snapshot: Vec<_> = self.listeners.borrow().clone();
        for listener in snapshot {
            listener(new, old);
        }
    }
}

impl Location for MemoryLocation {
    fn name(&self) -> &str {
        "memory"
    }

    fn fragment(&self) -> String {
        self.current()
    }

    fn set_fragment(&self, fragment: &str) {
        self.write(fragment, true);
    }

    fn replace_fragment(&self, fragment: &str) {
        self.write(fragment, false);
    }

    fn on_change(&self, listener: FragmentListener) {
        self.listeners.borrow_mut().push(Rc::from(listener));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_replace_and_back() {
        let location = MemoryLocation::new("#A-b");
        location.set_fragment("C-d");
        location.replace_fragment("#E-f");
        assert_eq!(location.history(), vec!["A-b", "E-f"]);

        assert!(location.back());
        assert_eq!(location.fragment(), "A-b");
        assert!(!location.back());

        location.set_fragment("G-h");
        assert_eq!(location.history(), vec!["A-b", "G-h"]);
    }

    #[test]
    fn test_listeners_see_new_and_old() {
        let location = MemoryLocation::new("A-b");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        location.on_change(Box::new(move |new: &str, old: &str| {
            sink.borrow_mut().push((new.to_string(), old.to_string()))
        }));

        location.set_fragment("C-d");
        location.set_fragment("C-d");
        location.back();

        assert_eq!(
            *seen.borrow(),
            vec![
                ("C-d".to_string(), "A-b".to_string()),
                ("A-b".to_string(), "C-d".to_string()),
            ]
        );
    }
}
