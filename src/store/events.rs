//! Synchronous change notification
//!
//! Listeners subscribe either to every change (`Topic::Change`) or to a single
//! key (`Topic::Key`), addressed by exact key bytes. Events are delivered
//! inline, inside the mutating call, before it returns. Single-shot listeners
//! are unregistered before they run.

use super::value::Value;
use bytes::Bytes;
use siphasher::sip::SipHasher13;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::rc::Rc;
use tracing::warn;

/// Listeners may mutate the store again; nesting stops at this depth
///
/// Past it, only single-shot listeners still hear the event. They are
/// unregistered before running, so they cannot recurse forever, and WATCH
/// depends on never missing a change. Repeat listeners (blocked pops) miss
/// it and keep waiting for the next one.
pub const MAX_EMIT_DEPTH: usize = 32;

/// A mutation observed by the store
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Set { key: Bytes, value: Value },
    Del { key: Bytes },
    Expire { key: Bytes, expiration: u64 },
    Persist { key: Bytes },
    Evict { key: Bytes },
    Flush,
}

impl ChangeEvent {
    /// Key the event is about, `None` for flushes
    pub fn key(&self) -> Option<&Bytes> {
        match self {
            ChangeEvent::Set { key, .. }
            | ChangeEvent::Del { key }
            | ChangeEvent::Expire { key, .. }
            | ChangeEvent::Persist { key }
            | ChangeEvent::Evict { key } => Some(key),
            ChangeEvent::Flush => None,
        }
    }
}

/// Subscription channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every change in the keyspace
    Change,
    /// Changes to one exact key
    Key(Bytes),
}

impl Topic {
    pub fn key(key: impl Into<Bytes>) -> Self {
        Topic::Key(key.into())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Change => f.write_str("change"),
            Topic::Key(key) => {
                f.write_str("key:")?;
                for byte in key.iter() {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// Handle returned on subscription, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener = Rc<dyn Fn(&ChangeEvent)>;

struct Subscriber {
    id: ListenerId,
    once: bool,
    alive: Rc<Cell<bool>>,
    listener: Listener,
}

type KeyedSubscribers = HashMap<Bytes, Vec<Subscriber>, BuildHasherDefault<SipHasher13>>;

/// Registry of change listeners
#[derive(Default)]
pub struct EventBus {
    next_id: Cell<u64>,
    global: RefCell<Vec<Subscriber>>,
    keyed: RefCell<KeyedSubscribers>,
    depth: Cell<usize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener that fires on every matching event
    pub fn on(&self, topic: Topic, listener: impl Fn(&ChangeEvent) + 'static) -> ListenerId {
        self.subscribe(topic, false, Rc::new(listener))
    }

    /// Register a listener that fires on the next matching event only
    pub fn once(&self, topic: Topic, listener: impl Fn(&ChangeEvent) + 'static) -> ListenerId {
        self.subscribe(topic, true, Rc::new(listener))
    }

    /// Unregister a listener; returns false if it was already gone
    pub fn remove_listener(&self, topic: &Topic, id: ListenerId) -> bool {
        let mut removed = None;
        match topic {
            Topic::Change => {
                let mut global = self.global.borrow_mut();
                if let Some(pos) = global.iter().position(|s| s.id == id) {
                    removed = Some(global.remove(pos));
                }
            }
            Topic::Key(key) => {
                let mut keyed = self.keyed.borrow_mut();
                if let Some(subs) = keyed.get_mut(key) {
                    if let Some(pos) = subs.iter().position(|s| s.id == id) {
                        removed = Some(subs.remove(pos));
                    }
                    if subs.is_empty() {
                        keyed.remove(key);
                    }
                }
            }
        }

        match removed {
            Some(subscriber) => {
                subscriber.alive.set(false);
                true
            }
            None => false,
        }
    }

    /// Number of listeners registered on a topic
    pub fn listener_count(&self, topic: &Topic) -> usize {
        match topic {
            Topic::Change => self.global.borrow().len(),
            Topic::Key(key) => self.keyed.borrow().get(key).map_or(0, Vec::len),
        }
    }

    /// Whether an event about `key` would reach anyone
    pub fn is_observed(&self, key: &[u8]) -> bool {
        !self.global.borrow().is_empty() || self.keyed.borrow().contains_key(key)
    }

    /// Deliver an event to every matching listener, synchronously
    pub fn emit(&self, event: ChangeEvent) {
        let depth = self.depth.get();
        let once_only = depth >= MAX_EMIT_DEPTH;
        if once_only {
            warn!(depth, ?event, "reentrant change notification dropped for repeat listeners");
        }

        let mut targets = Vec::new();
        take_targets(&mut self.global.borrow_mut(), &mut targets, once_only);
        {
            let mut keyed = self.keyed.borrow_mut();
            match event.key() {
                Some(key) => {
                    if let Some(subs) = keyed.get_mut(key) {
                        take_targets(subs, &mut targets, once_only);
                        if subs.is_empty() {
                            keyed.remove(key);
                        }
                    }
                }
                None => {
                    for subs in keyed.values_mut() {
                        take_targets(subs, &mut targets, once_only);
                    }
                    keyed.retain(|_, subs| !subs.is_empty());
                }
            }
        }

        if targets.is_empty() {
            return;
        }

        self.depth.set(depth + 1);
        let _guard = DepthGuard(&self.depth);
        for (alive, listener) in targets {
            if alive.get() {
                listener(&event);
            }
        }
    }

    fn subscribe(&self, topic: Topic, once: bool, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let subscriber = Subscriber {
            id,
            once,
            alive: Rc::new(Cell::new(true)),
            listener,
        };

        match topic {
            Topic::Change => self.global.borrow_mut().push(subscriber),
            Topic::Key(key) => self.keyed.borrow_mut().entry(key).or_default().push(subscriber),
        }
        id
    }
}

/// Snapshot the listeners to call; single-shot ones leave the registry now
fn take_targets(
    subs: &mut Vec<Subscriber>,
    targets: &mut Vec<(Rc<Cell<bool>>, Listener)>,
    once_only: bool,
) {
    subs.retain(|s| {
        if once_only && !s.once {
            return true;
        }
        targets.push((s.alive.clone(), s.listener.clone()));
        !s.once
    });
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("global", &self.global.borrow().len())
            .field("keyed", &self.keyed.borrow().len())
            .field("depth", &self.depth.get())
            .finish()
    }
}
