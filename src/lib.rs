//! FerrumSlot - an in-memory, cluster-aware key-value store speaking RESP
//!
//! Every command runs on a single kernel thread that owns the keyspace:
//! - `protocol` decodes and encodes RESP frames
//! - `dispatch` turns frames into jobs, checking slots and transactions first
//! - `kernel` runs those jobs one at a time, in arrival order
//! - `store` holds the reactive keyspace the commands operate on
//! - `cluster` maps keys to hash slots and slots to nodes

pub mod protocol;
pub mod store;
pub mod kernel;
pub mod cluster;
pub mod commands;
pub mod transaction;
pub mod dispatch;
pub mod scripting;
pub mod config;
pub mod server;
pub mod web;
pub mod error;

/// Re-export commonly used types
pub use store::{Keyspace, Entry, Value};
pub use protocol::{RespValue, RespError};
pub use commands::{Command, CommandContext, Reply};
pub use cluster::{calculate_slot, OwnershipValidator, SlotRouter};
pub use dispatch::{Dispatcher, Services};
pub use config::Config;
pub use error::CommandError;
