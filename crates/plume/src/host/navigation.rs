/// Page location control.
pub trait Navigator: Send + Sync {
    /// Path and query of the current page, if known.
    fn current_location(&self) -> Option<String>;

    /// Navigate to `path`.
    fn navigate(&self, path: &str);

    /// Reload the page, discarding all in-memory state.
    fn reload(&self);
}
