//! Cluster slot routing
//!
//! The keyspace is split into 16384 hash slots. This module computes a key's
//! slot, rejects commands whose keys span several slots, and checks that the
//! local node serves a slot before anything executes, redirecting with
//! `MOVED` otherwise.

mod ownership;
mod router;
mod slot;
mod topology;

pub use ownership::OwnershipValidator;
pub use router::{validate_command_slot, SlotRouter};
pub use slot::{calculate_slot, crc16, hash_tag, Slot, CLUSTER_SLOTS};
pub use topology::{Discovery, NodeId, NodeInfo, SlotRange, SlotTopology, TopologyError};
