//! Slot topology and node discovery
//!
//! A topology assigns every node a list of disjoint, inclusive slot ranges.
//! Ranges are checked for overlap when the topology is built, so a slot has
//! at most one owner.

use super::slot::{Slot, CLUSTER_SLOTS};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Node identity as configured
pub type NodeId = String;

/// An inclusive range of slots, `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotRange {
    pub start: Slot,
    pub end: Slot,
}

impl SlotRange {
    pub fn new(start: Slot, end: Slot) -> Result<Self, TopologyError> {
        if start > end || end >= CLUSTER_SLOTS {
            return Err(TopologyError::InvalidRange { start, end });
        }
        Ok(SlotRange { start, end })
    }

    /// Every slot
    pub fn full() -> Self {
        SlotRange {
            start: 0,
            end: CLUSTER_SLOTS - 1,
        }
    }

    pub fn contains(&self, slot: Slot) -> bool {
        slot >= self.start && slot <= self.end
    }

    /// Number of slots covered; never zero
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// A node and the slots it serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
    pub slots: Vec<SlotRange>,
}

impl NodeInfo {
    pub fn owns(&self, slot: Slot) -> bool {
        self.slots.iter().any(|range| range.contains(slot))
    }

    pub fn slot_count(&self) -> usize {
        self.slots.iter().map(SlotRange::len).sum()
    }
}

/// Invalid slot maps
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("invalid slot range {start}-{end}")]
    InvalidRange { start: Slot, end: Slot },

    #[error("slot {slot} assigned to both '{first}' and '{second}'")]
    Overlap {
        slot: Slot,
        first: NodeId,
        second: NodeId,
    },

    #[error("node '{0}' declared twice")]
    DuplicateNode(NodeId),
}

/// Source of truth for who serves which slot
pub trait Discovery: Send + Sync {
    fn get_by_id(&self, id: &str) -> Option<NodeInfo>;

    /// Owner of a slot, if any node serves it
    fn get_by_slot(&self, slot: Slot) -> Option<NodeInfo>;

    fn nodes(&self) -> Vec<NodeInfo>;
}

/// Static topology, as loaded from configuration
#[derive(Debug, Clone)]
pub struct SlotTopology {
    nodes: Vec<NodeInfo>,
    /// Index into `nodes` for every slot
    owners: Box<[Option<usize>]>,
}

impl SlotTopology {
    pub fn new(nodes: Vec<NodeInfo>) -> Result<Self, TopologyError> {
        let mut owners = vec![None; CLUSTER_SLOTS as usize].into_boxed_slice();

        for (index, node) in nodes.iter().enumerate() {
            if nodes[..index].iter().any(|other| other.id == node.id) {
                return Err(TopologyError::DuplicateNode(node.id.clone()));
            }

            for range in &node.slots {
                SlotRange::new(range.start, range.end)?;
                for slot in range.start..=range.end {
                    let owner = &mut owners[slot as usize];
                    if let Some(previous) = *owner {
                        let first: &NodeInfo = &nodes[previous];
                        return Err(TopologyError::Overlap {
                            slot,
                            first: first.id.clone(),
                            second: node.id.clone(),
                        });
                    }
                    *owner = Some(index);
                }
            }
        }

        Ok(SlotTopology { nodes, owners })
    }

    /// A single node serving every slot
    pub fn standalone(id: impl Into<NodeId>, host: impl Into<String>, port: u16) -> Self {
        let node = NodeInfo {
            id: id.into(),
            host: host.into(),
            port,
            slots: vec![SlotRange::full()],
        };
        SlotTopology {
            nodes: vec![node],
            owners: vec![Some(0); CLUSTER_SLOTS as usize].into_boxed_slice(),
        }
    }

    /// Slots no node serves
    pub fn unassigned(&self) -> usize {
        self.owners.iter().filter(|owner| owner.is_none()).count()
    }
}

impl Discovery for SlotTopology {
    fn get_by_id(&self, id: &str) -> Option<NodeInfo> {
        self.nodes.iter().find(|node| node.id == id).cloned()
    }

    fn get_by_slot(&self, slot: Slot) -> Option<NodeInfo> {
        let index = (*self.owners.get(slot as usize)?)?;
        self.nodes.get(index).cloned()
    }

    fn nodes(&self) -> Vec<NodeInfo> {
        self.nodes.clone()
    }
}
