//! Server configuration
//!
//! Read from an optional JSON file; every field has a default, so an empty
//! object (or no file at all) gives a standalone node on the usual ports.
//!
//! ```json
//! {
//!   "bind": "127.0.0.1:7000",
//!   "node_id": "a",
//!   "cluster": [
//!     { "id": "a", "host": "127.0.0.1", "port": 7000, "slots": [[0, 8191]] },
//!     { "id": "b", "host": "127.0.0.1", "port": 7001, "slots": [[8192, 16383]] }
//!   ]
//! }
//! ```

use crate::cluster::{NodeInfo, OwnershipValidator, Slot, SlotRange, SlotTopology};
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "FERRUMSLOT_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RESP listener address
    pub bind: String,
    /// HTTP listener address; `null` disables the web interface
    pub web_bind: Option<String>,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Identity of this node in the cluster map
    pub node_id: String,
    /// Full slot map; absent means standalone
    pub cluster: Option<Vec<NodeConfig>>,
}

/// One node of the slot map
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub host: String,
    pub port: u16,
    /// Inclusive `[start, end]` pairs
    pub slots: Vec<[Slot; 2]>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1:6379".to_string(),
            web_bind: Some("127.0.0.1:8080".to_string()),
            log_level: "info".to_string(),
            node_id: "local".to_string(),
            cluster: None,
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("invalid configuration")
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }

    /// The file named by the first argument or `FERRUMSLOT_CONFIG`, else defaults
    pub fn from_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let path = args.next().or_else(|| std::env::var(CONFIG_ENV).ok());
        match path {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Build the ownership validator for this node
    pub fn ownership(&self) -> anyhow::Result<OwnershipValidator> {
        let Some(nodes) = &self.cluster else {
            let addr: SocketAddr = self
                .bind
                .parse()
                .with_context(|| format!("invalid bind address {}", self.bind))?;
            return Ok(OwnershipValidator::standalone_at(
                self.node_id.clone(),
                addr.ip().to_string(),
                addr.port(),
            ));
        };

        let nodes = nodes
            .iter()
            .map(NodeConfig::to_node)
            .collect::<anyhow::Result<Vec<_>>>()?;
        if !nodes.iter().any(|node| node.id == self.node_id) {
            return Err(anyhow!("node '{}' is not part of the cluster map", self.node_id));
        }

        let topology = SlotTopology::new(nodes).context("invalid cluster map")?;
        Ok(OwnershipValidator::new(self.node_id.clone(), Arc::new(topology)))
    }
}

impl NodeConfig {
    fn to_node(&self) -> anyhow::Result<NodeInfo> {
        let slots = self
            .slots
            .iter()
            .map(|[start, end]| SlotRange::new(*start, *end))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("node '{}'", self.id))?;

        Ok(NodeInfo {
            id: self.id.clone(),
            host: self.host.clone(),
            port: self.port,
            slots,
        })
    }
}
