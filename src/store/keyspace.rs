//! The keyspace: authoritative key -> value map
//!
//! Single-threaded by construction: it lives on the kernel thread and is
//! shared through `Rc`. Every method takes `&self` and releases its internal
//! borrow before notifying listeners, so a listener may read or mutate the
//! keyspace again (that is how blocked pops consume a freshly pushed value
//! before the pushing command returns).
//!
//! Expiration is lazy: a dead entry is evicted, with an `Evict` event, the
//! next time anything touches its key.

use super::entry::{now_ms, Entry};
use super::events::{ChangeEvent, EventBus, ListenerId, Topic};
use super::value::Value;
use bytes::Bytes;
use siphasher::sip::SipHasher13;
use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use tracing::debug;

/// Type alias for our hash map with SipHasher
type StoreMap = HashMap<Bytes, Entry, BuildHasherDefault<SipHasher13>>;

/// TTL sentinel: the key does not exist
pub const TTL_MISSING: i64 = -2;

/// TTL sentinel: the key exists without expiration
pub const TTL_PERSISTENT: i64 = -1;

/// Reactive in-memory key-value store
pub struct Keyspace {
    entries: RefCell<StoreMap>,
    events: EventBus,
}

impl Keyspace {
    /// Create a new keyspace with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new keyspace with specified initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Keyspace {
            entries: RefCell::new(HashMap::with_capacity_and_hasher(
                capacity,
                BuildHasherDefault::<SipHasher13>::default(),
            )),
            events: EventBus::new(),
        }
    }

    /// Current value of a key, or `None` if absent or expired
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.view(key, Value::clone)
    }

    /// Borrow the current value without cloning it
    ///
    /// `f` must not call back into the keyspace.
    pub fn view<R>(&self, key: &[u8], f: impl FnOnce(&Value) -> R) -> Option<R> {
        self.evict_if_expired(key);
        self.entries.borrow().get(key).map(|entry| f(&entry.value))
    }

    /// Whether a live entry exists
    pub fn exists(&self, key: &[u8]) -> bool {
        self.view(key, |_| ()).is_some()
    }

    /// Insert or replace a value
    ///
    /// With `expiration`, the entry expires at that absolute instant. Without
    /// it, a live entry keeps whatever expiration it had; callers manage TTLs
    /// explicitly through `set_expiration` and `persist`.
    pub fn set(&self, key: impl Into<Bytes>, value: Value, expiration: Option<u64>) {
        let key = key.into();
        self.evict_if_expired(&key);

        let event_value = self.events.is_observed(&key).then(|| value.clone());
        {
            let mut entries = self.entries.borrow_mut();
            match entries.get_mut(&key) {
                Some(entry) => {
                    entry.value = value;
                    if expiration.is_some() {
                        entry.expire_at = expiration;
                    }
                }
                None => {
                    entries.insert(
                        key.clone(),
                        Entry {
                            value,
                            expire_at: expiration,
                        },
                    );
                }
            }
        }

        if let Some(value) = event_value {
            self.events.emit(ChangeEvent::Set { key, value });
        }
    }

    /// Mutate a live value in place, then emit `Set`
    ///
    /// Returns `None` without emitting if the key is absent. `f` must not call
    /// back into the keyspace.
    pub fn modify<R>(&self, key: &[u8], f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        self.evict_if_expired(key);

        let observed = self.events.is_observed(key);
        let (key, (result, event_value)) = self.with_entry(key, |entry| {
            let result = f(&mut entry.value);
            Some((result, observed.then(|| entry.value.clone())))
        })?;

        if let Some(value) = event_value {
            self.events.emit(ChangeEvent::Set { key, value });
        }
        Some(result)
    }

    /// Remove a key; emits `Del` only when something was removed
    pub fn del(&self, key: &[u8]) -> bool {
        if self.evict_if_expired(key) {
            return false;
        }

        let removed = self.entries.borrow_mut().remove_entry(key);
        match removed {
            Some((key, _)) => {
                self.events.emit(ChangeEvent::Del { key });
                true
            }
            None => false,
        }
    }

    /// Set an absolute expiration (Unix ms) on a live key
    pub fn set_expiration(&self, key: &[u8], expiration: u64) -> bool {
        if self.evict_if_expired(key) {
            return false;
        }

        let Some((key, ())) = self.with_entry(key, |entry| {
            entry.expire_at = Some(expiration);
            Some(())
        }) else {
            return false;
        };

        self.events.emit(ChangeEvent::Expire { key, expiration });
        true
    }

    /// Drop the expiration of a live key; false if absent or not volatile
    pub fn persist(&self, key: &[u8]) -> bool {
        if self.evict_if_expired(key) {
            return false;
        }

        let Some((key, _)) = self.with_entry(key, |entry| entry.expire_at.take()) else {
            return false;
        };

        self.events.emit(ChangeEvent::Persist { key });
        true
    }

    /// `-2` if absent, `-1` without expiration, else the absolute expiration in Unix ms
    pub fn ttl(&self, key: &[u8]) -> i64 {
        self.evict_if_expired(key);
        match self.entries.borrow().get(key) {
            None => TTL_MISSING,
            Some(Entry { expire_at: None, .. }) => TTL_PERSISTENT,
            Some(Entry {
                expire_at: Some(at),
                ..
            }) => *at as i64,
        }
    }

    /// Remove every key; emits a single `Flush`
    pub fn flushdb(&self) {
        let count = {
            let mut entries = self.entries.borrow_mut();
            let count = entries.len();
            entries.clear();
            count
        };
        debug!(count, "keyspace flushed");
        self.events.emit(ChangeEvent::Flush);
    }

    /// Same as `flushdb`: there is a single keyspace
    pub fn flushall(&self) {
        self.flushdb();
    }

    /// Number of live keys; expired entries met along the way are evicted
    pub fn size(&self) -> usize {
        let now = now_ms();
        let expired: Vec<Bytes> = self
            .entries
            .borrow()
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.evict_if_expired(key);
        }
        self.entries.borrow().len()
    }

    /// Live keys, in no particular order
    pub fn keys(&self) -> Vec<Bytes> {
        let now = now_ms();
        self.entries
            .borrow()
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Get statistics about the keyspace
    pub fn stats(&self) -> StoreStats {
        let now = now_ms();
        let entries = self.entries.borrow();
        let live = entries.iter().filter(|(_, entry)| !entry.is_expired_at(now));

        let mut stats = StoreStats::default();
        for (key, entry) in live {
            stats.keys += 1;
            if entry.expire_at.is_some() {
                stats.expires += 1;
            }
            stats.used_memory_bytes += entry.memory_usage(key.len());
        }
        stats
    }

    /// Subscribe to changes; see `EventBus::on`
    pub fn on(&self, topic: Topic, listener: impl Fn(&ChangeEvent) + 'static) -> ListenerId {
        self.events.on(topic, listener)
    }

    /// Subscribe to the next change only; see `EventBus::once`
    pub fn once(&self, topic: Topic, listener: impl Fn(&ChangeEvent) + 'static) -> ListenerId {
        self.events.once(topic, listener)
    }

    pub fn remove_listener(&self, topic: &Topic, id: ListenerId) -> bool {
        self.events.remove_listener(topic, id)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run `f` on a stored entry, returning the stored key alongside its result
    fn with_entry<R>(&self, key: &[u8], f: impl FnOnce(&mut Entry) -> Option<R>) -> Option<(Bytes, R)> {
        let mut entries = self.entries.borrow_mut();
        let stored = entries.get_key_value(key).map(|(k, _)| k.clone())?;
        let entry = entries.get_mut(key)?;
        f(entry).map(|result| (stored, result))
    }

    /// Evict the key if its entry is dead; returns whether it did
    fn evict_if_expired(&self, key: &[u8]) -> bool {
        let evicted = {
            let mut entries = self.entries.borrow_mut();
            match entries.get(key) {
                Some(entry) if entry.is_expired() => entries.remove_entry(key).map(|(k, _)| k),
                _ => None,
            }
        };

        match evicted {
            Some(key) => {
                debug!(key = ?key, "evicted expired key");
                self.events.emit(ChangeEvent::Evict { key });
                true
            }
            None => false,
        }
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the keyspace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub keys: usize,
    pub expires: usize,
    pub used_memory_bytes: usize,
}
