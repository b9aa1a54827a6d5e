//! WATCH bookkeeping
//!
//! Each watched key gets a single-shot listener on the keyspace that marks
//! its connection dirty. EXEC on a dirty connection is refused; EXEC,
//! DISCARD, UNWATCH and disconnect all release the listeners.

use crate::store::{Keyspace, ListenerId, Topic};
use bytes::Bytes;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

#[derive(Default)]
struct Watches {
    dirty: Rc<Cell<bool>>,
    registrations: Vec<(Topic, ListenerId)>,
}

/// Watched keys per connection; lives next to the keyspace it listens to
#[derive(Default)]
pub struct WatchRegistry {
    connections: HashMap<u64, Watches>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching `keys` for a connection
    pub fn watch(&mut self, store: &Keyspace, connection_id: u64, keys: &[Bytes]) {
        let watches = self.connections.entry(connection_id).or_default();

        for key in keys {
            let topic = Topic::key(key.clone());
            let dirty = watches.dirty.clone();
            let id = store.once(topic.clone(), move |_| dirty.set(true));
            watches.registrations.push((topic, id));
        }
        debug!(
            connection = connection_id,
            watched = watches.registrations.len(),
            "keys watched"
        );
    }

    /// Whether a watched key of this connection changed
    pub fn is_dirty(&self, connection_id: u64) -> bool {
        self.connections
            .get(&connection_id)
            .is_some_and(|w| w.dirty.get())
    }

    /// Drop every watch of a connection, returning whether one had fired
    pub fn release(&mut self, store: &Keyspace, connection_id: u64) -> bool {
        let Some(watches) = self.connections.remove(&connection_id) else {
            return false;
        };
        for (topic, id) in &watches.registrations {
            // Fired single-shot listeners are already gone
            store.remove_listener(topic, *id);
        }
        watches.dirty.get()
    }

    /// Connections with at least one watch
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Value;

    #[test]
    fn test_change_marks_dirty() {
        let store = Keyspace::new();
        let mut watches = WatchRegistry::new();
        store.set("x", Value::string("1"), None);

        watches.watch(&store, 7, &[Bytes::from("x")]);
        assert!(!watches.is_dirty(7));

        store.set("x", Value::string("2"), None);
        assert!(watches.is_dirty(7));
        assert!(watches.release(&store, 7));
        assert!(!watches.is_dirty(7));
        assert!(watches.is_empty());
    }

    #[test]
    fn test_other_keys_and_connections_unaffected() {
        let store = Keyspace::new();
        let mut watches = WatchRegistry::new();

        watches.watch(&store, 1, &[Bytes::from("a")]);
        watches.watch(&store, 2, &[Bytes::from("b")]);
        store.set("a", Value::string("1"), None);

        assert!(watches.is_dirty(1));
        assert!(!watches.is_dirty(2));
        assert_eq!(watches.len(), 2);
    }

    #[test]
    fn test_release_unsubscribes() {
        let store = Keyspace::new();
        let mut watches = WatchRegistry::new();

        watches.watch(&store, 1, &[Bytes::from("a"), Bytes::from("b")]);
        assert_eq!(store.events().listener_count(&Topic::key("a")), 1);

        assert!(!watches.release(&store, 1));
        assert_eq!(store.events().listener_count(&Topic::key("a")), 0);
        assert_eq!(store.events().listener_count(&Topic::key("b")), 0);
        assert!(!watches.release(&store, 1));
    }

    #[test]
    fn test_flush_and_delete_count_as_changes() {
        let store = Keyspace::new();
        let mut watches = WatchRegistry::new();
        store.set("a", Value::string("1"), None);

        watches.watch(&store, 1, &[Bytes::from("missing")]);
        watches.watch(&store, 2, &[Bytes::from("a")]);
        store.flushall();
        assert!(watches.is_dirty(1));
        assert!(watches.is_dirty(2));
    }
}
