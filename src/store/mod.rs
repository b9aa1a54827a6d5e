//! In-memory storage module
//!
//! Provides the keyspace and its change notifications.
//! This module is independent of protocol and command handling (loose coupling).

mod entry;
mod events;
mod keyspace;
mod value;

pub use entry::{now_ms, Entry};
pub use events::{ChangeEvent, EventBus, Listener, ListenerId, Topic, MAX_EMIT_DEPTH};
pub use keyspace::{Keyspace, StoreStats, TTL_MISSING, TTL_PERSISTENT};
pub use value::{Value, ValueType};
