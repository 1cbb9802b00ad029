/// Called with `(new_fragment, old_fragment)` after the fragment changed.
pub type FragmentListener = Box<dyn Fn(&str, &str)>;

/// The address bar, or whatever plays its role.
///
/// Fragments are exchanged without their leading `#`. Notifications are
/// delivered synchronously from inside `set_fragment`/`replace_fragment`.
pub trait Location {
    /// Returns the name of the location backend.
    fn name(&self) -> &str;

    fn fragment(&self) -> String;

    /// Writes a fragment and creates a history entry.
    fn set_fragment(&self, fragment: &str);

    /// Writes a fragment in place of the current history entry.
    fn replace_fragment(&self, fragment: &str);

    fn on_change(&self, listener: FragmentListener);
}
