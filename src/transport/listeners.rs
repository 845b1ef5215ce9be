//! Per-socket table of named-event listeners.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::identifiers::ListenerId;

// ============================================================================
// Types
// ============================================================================

/// Event listener callback.
///
/// Runs on the socket task. Must not block.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

// ============================================================================
// ListenerTable
// ============================================================================

/// Event name → listeners, in registration order.
#[derive(Default)]
pub struct ListenerTable {
    by_event: FxHashMap<String, Vec<(ListenerId, Listener)>>,
}

impl ListenerTable {
    /// Adds a listener under `event`.
    pub fn insert(&mut self, event: &str, id: ListenerId, listener: Listener) {
        self.by_event
            .entry(event.to_owned())
            .or_default()
            .push((id, listener));
    }

    /// Removes the listener `id` from `event`. Returns `true` if it was present.
    pub fn remove(&mut self, event: &str, id: ListenerId) -> bool {
        let Some(list) = self.by_event.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.by_event.remove(event);
        }
        removed
    }

    /// Clones the listeners for `event` so they can run outside the lock.
    #[must_use]
    pub fn snapshot(&self, event: &str) -> Vec<Listener> {
        self.by_event
            .get(event)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }

    /// Total number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_event.values().map(Vec::len).sum()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> Listener {
        let counter = Arc::clone(counter);
        Arc::new(move |_: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_remove_only_targets_one_listener() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut table = ListenerTable::default();
        let first = ListenerId::next();
        let second = ListenerId::next();
        table.insert("new_message", first, counting(&hits));
        table.insert("new_message", second, counting(&hits));

        assert!(table.remove("new_message", first));
        assert!(!table.remove("new_message", first));
        assert_eq!(table.len(), 1);

        for listener in table.snapshot("new_message") {
            listener(&Value::Null);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_last_listener_drops_event() {
        let mut table = ListenerTable::default();
        let id = ListenerId::next();
        table.insert("chat_updated", id, Arc::new(|_: &Value| {}));
        assert!(table.remove("chat_updated", id));
        assert!(table.is_empty());
        assert!(table.snapshot("chat_updated").is_empty());
    }

    #[test]
    fn test_remove_from_wrong_event_is_noop() {
        let mut table = ListenerTable::default();
        let id = ListenerId::next();
        table.insert("chat_updated", id, Arc::new(|_: &Value| {}));
        assert!(!table.remove("new_message", id));
        assert_eq!(table.len(), 1);
    }
}
