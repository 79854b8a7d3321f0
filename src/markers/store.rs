use std::collections::HashMap;

/// Mutable marker state: location key -> hex color string. A key being
/// present means the location is marked; there is no third state.
///
/// The store is pure in-memory bookkeeping. Persistence is the
/// caller's concern; nothing here can fail.
#[derive(Default)]
pub struct MarkerStore {
    markers: HashMap<String, String>,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire state (initial load from the backend).
    pub fn load(&mut self, markers: HashMap<String, String>) {
        self.markers = markers;
    }

    /// Flip membership for `key`. Removes the marker if present,
    /// otherwise inserts it with `color` — the color active *now*, so a
    /// marker toggled off and on again picks up the current selection.
    /// Returns the new membership.
    pub fn toggle(&mut self, key: &str, color: &str) -> bool {
        if self.markers.remove(key).is_some() {
            false
        } else {
            self.markers.insert(key.to_string(), color.to_string());
            true
        }
    }

    /// Remove every marker.
    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub fn is_marked(&self, key: &str) -> bool {
        self.markers.contains_key(key)
    }

    pub fn color_of(&self, key: &str) -> Option<&str> {
        self.markers.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Clone of the full mapping, as handed to the persistence backend.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.markers.clone()
    }
}
