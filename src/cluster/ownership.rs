//! Local slot ownership
//!
//! The node identity is injected; ownership is read through the discovery
//! collaborator on every check so a refreshed topology takes effect at once.

use super::slot::Slot;
use super::topology::{Discovery, NodeId, NodeInfo, SlotRange, SlotTopology};
use crate::error::CommandError;
use std::sync::Arc;
use tracing::debug;

/// Checks that this node serves a slot, redirecting otherwise
pub struct OwnershipValidator {
    node_id: NodeId,
    discovery: Arc<dyn Discovery>,
    clustered: bool,
}

impl OwnershipValidator {
    pub fn new(node_id: impl Into<NodeId>, discovery: Arc<dyn Discovery>) -> Self {
        OwnershipValidator {
            node_id: node_id.into(),
            discovery,
            clustered: true,
        }
    }

    /// A node that owns every slot and does no slot routing
    pub fn standalone(node_id: impl Into<NodeId>) -> Self {
        Self::standalone_at(node_id, "127.0.0.1", 6379)
    }

    /// Standalone node advertising the address it listens on
    pub fn standalone_at(node_id: impl Into<NodeId>, host: impl Into<String>, port: u16) -> Self {
        let node_id = node_id.into();
        let topology = SlotTopology::standalone(node_id.clone(), host, port);
        OwnershipValidator {
            clustered: false,
            ..Self::new(node_id, Arc::new(topology))
        }
    }

    /// Whether commands are routed by slot at all
    ///
    /// A standalone node serves every key, so neither cross-slot nor
    /// ownership checks apply.
    pub fn is_clustered(&self) -> bool {
        self.clustered
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn discovery(&self) -> &Arc<dyn Discovery> {
        &self.discovery
    }

    /// This node's descriptor, if discovery knows it
    pub fn local_node(&self) -> Option<NodeInfo> {
        self.discovery.get_by_id(&self.node_id)
    }

    /// Slot ranges served by this node
    pub fn local_ranges(&self) -> Vec<SlotRange> {
        self.local_node().map(|node| node.slots).unwrap_or_default()
    }

    /// `Ok` if this node serves `slot`, else `MOVED` to its owner
    ///
    /// A slot nobody serves yields `CLUSTERDOWN`.
    pub fn validate_slot_ownership(&self, slot: Slot) -> Result<(), CommandError> {
        if self.local_ranges().iter().any(|range| range.contains(slot)) {
            return Ok(());
        }

        match self.discovery.get_by_slot(slot) {
            Some(owner) => {
                debug!(slot, owner = %owner.id, "slot owned elsewhere");
                Err(CommandError::Moved {
                    slot,
                    host: owner.host,
                    port: owner.port,
                })
            }
            None => Err(CommandError::ClusterDown),
        }
    }
}

impl std::fmt::Debug for OwnershipValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnershipValidator")
            .field("node_id", &self.node_id)
            .field("clustered", &self.clustered)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Discovery double returning whatever it was told
    struct FixedDiscovery {
        local: NodeInfo,
        remote: Option<NodeInfo>,
    }

    impl Discovery for FixedDiscovery {
        fn get_by_id(&self, id: &str) -> Option<NodeInfo> {
            (id == self.local.id).then(|| self.local.clone())
        }

        fn get_by_slot(&self, _slot: Slot) -> Option<NodeInfo> {
            self.remote.clone()
        }

        fn nodes(&self) -> Vec<NodeInfo> {
            std::iter::once(self.local.clone()).chain(self.remote.clone()).collect()
        }
    }

    fn validator(remote: Option<NodeInfo>) -> OwnershipValidator {
        let local = NodeInfo {
            id: "me".to_string(),
            host: "127.0.0.1".to_string(),
            port: 7000,
            slots: vec![SlotRange { start: 0, end: 99 }, SlotRange { start: 200, end: 299 }],
        };
        OwnershipValidator::new("me", Arc::new(FixedDiscovery { local, remote }))
    }

    #[test]
    fn test_owned_slots_pass() {
        let validator = validator(None);
        assert_eq!(validator.validate_slot_ownership(0), Ok(()));
        assert_eq!(validator.validate_slot_ownership(99), Ok(()));
        assert_eq!(validator.validate_slot_ownership(250), Ok(()));
    }

    #[test]
    fn test_foreign_slot_redirects_to_reported_owner() {
        let validator = validator(Some(NodeInfo {
            id: "other".to_string(),
            host: "10.1.2.3".to_string(),
            port: 7777,
            slots: Vec::new(),
        }));

        assert_eq!(
            validator.validate_slot_ownership(150),
            Err(CommandError::Moved {
                slot: 150,
                host: "10.1.2.3".to_string(),
                port: 7777
            })
        );
    }

    #[test]
    fn test_unserved_slot_is_cluster_down() {
        assert_eq!(
            validator(None).validate_slot_ownership(150),
            Err(CommandError::ClusterDown)
        );
    }

    #[test]
    fn test_standalone_owns_everything() {
        let validator = OwnershipValidator::standalone("solo");
        assert_eq!(validator.validate_slot_ownership(16383), Ok(()));
        assert_eq!(validator.local_ranges(), vec![SlotRange::full()]);
        assert!(!validator.is_clustered());
        assert!(self::validator(None).is_clustered());
    }
}
