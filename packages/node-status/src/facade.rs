//! Node Status Facade
//!
//! Read-only queries over a running node. The facade depends on two
//! capability traits, so any backend providing `{health, network_state,
//! peers}` and the runtime identity queries plugs in unchanged:
//!
//! - **`NetworkApi`**: connectivity (health, local network state, peers)
//! - **`RuntimeApi`**: runtime identity (chain, name, properties, version)
//!
//! [`SystemModule`] is the pass-through adapter exposed to callers, and
//! [`StaticNode`] answers every query from a fixed [`NodeSnapshot`].
//!
//! # Examples
//!
//! ```rust
//! use edgestore_node_status::{NodeSnapshot, StaticNode, SystemModule};
//! use std::sync::Arc;
//!
//! # async fn example() -> edgestore_node_status::Result<()> {
//! let node = Arc::new(StaticNode::new(NodeSnapshot::default()));
//! let system = SystemModule::new(node.clone(), node);
//!
//! let health = system.health().await?;
//! assert_eq!(health.peers, 0);
//! # Ok(())
//! # }
//! ```

use crate::error::{NodeStatusError, Result};
use crate::status::{Health, NetworkState, PeerInfo};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn health(&self) -> Result<Health>;

    async fn network_state(&self) -> Result<NetworkState>;

    async fn peers(&self) -> Result<Vec<PeerInfo>>;
}

#[async_trait]
pub trait RuntimeApi: Send + Sync {
    async fn chain(&self) -> Result<String>;

    async fn name(&self) -> Result<String>;

    async fn properties(&self) -> Result<String>;

    async fn version(&self) -> Result<String>;
}

/// Runtime identity gathered in one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeInfo {
    pub chain: String,
    pub name: String,
    pub properties: String,
    pub version: String,
}

/// Pass-through system module over the network and runtime capabilities
#[derive(Clone)]
pub struct SystemModule {
    network: Arc<dyn NetworkApi>,
    runtime: Arc<dyn RuntimeApi>,
}

impl SystemModule {
    pub fn new(network: Arc<dyn NetworkApi>, runtime: Arc<dyn RuntimeApi>) -> Self {
        Self { network, runtime }
    }

    pub async fn health(&self) -> Result<Health> {
        self.network.health().await
    }

    pub async fn network_state(&self) -> Result<NetworkState> {
        self.network.network_state().await
    }

    pub async fn peers(&self) -> Result<Vec<PeerInfo>> {
        self.network.peers().await
    }

    pub async fn chain(&self) -> Result<String> {
        self.runtime.chain().await
    }

    pub async fn name(&self) -> Result<String> {
        self.runtime.name().await
    }

    pub async fn properties(&self) -> Result<String> {
        self.runtime.properties().await
    }

    pub async fn version(&self) -> Result<String> {
        self.runtime.version().await
    }

    pub async fn runtime_info(&self) -> Result<RuntimeInfo> {
        Ok(RuntimeInfo {
            chain: self.chain().await?,
            name: self.name().await?,
            properties: self.properties().await?,
            version: self.version().await?,
        })
    }
}

impl std::fmt::Debug for SystemModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemModule").finish_non_exhaustive()
    }
}

/// Everything a [`StaticNode`] reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub health: Health,
    pub network_state: NetworkState,
    pub peers: Vec<PeerInfo>,
    pub chain: String,
    pub name: String,
    pub properties: String,
    pub version: String,
}

impl Default for NodeSnapshot {
    fn default() -> Self {
        Self {
            health: Health::default(),
            network_state: NetworkState::default(),
            peers: Vec::new(),
            chain: "dev".to_string(),
            name: "edgestore".to_string(),
            properties: "{}".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Node that answers from a fixed snapshot, or is unavailable
#[derive(Debug, Clone)]
pub struct StaticNode {
    snapshot: std::result::Result<NodeSnapshot, NodeStatusError>,
}

impl StaticNode {
    pub fn new(snapshot: NodeSnapshot) -> Self {
        Self {
            snapshot: Ok(snapshot),
        }
    }

    /// Node whose every query fails with `Unavailable`
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            snapshot: Err(NodeStatusError::unavailable(reason)),
        }
    }

    fn snapshot(&self) -> Result<&NodeSnapshot> {
        self.snapshot.as_ref().map_err(|e| {
            tracing::debug!("Status query on unavailable node: {}", e);
            e.clone()
        })
    }
}

#[async_trait]
impl NetworkApi for StaticNode {
    async fn health(&self) -> Result<Health> {
        let snapshot = self.snapshot()?;
        Ok(Health {
            peers: snapshot.peers.len(),
            ..snapshot.health.clone()
        })
    }

    async fn network_state(&self) -> Result<NetworkState> {
        Ok(self.snapshot()?.network_state.clone())
    }

    async fn peers(&self) -> Result<Vec<PeerInfo>> {
        Ok(self.snapshot()?.peers.clone())
    }
}

#[async_trait]
impl RuntimeApi for StaticNode {
    async fn chain(&self) -> Result<String> {
        Ok(self.snapshot()?.chain.clone())
    }

    async fn name(&self) -> Result<String> {
        Ok(self.snapshot()?.name.clone())
    }

    async fn properties(&self) -> Result<String> {
        Ok(self.snapshot()?.properties.clone())
    }

    async fn version(&self) -> Result<String> {
        Ok(self.snapshot()?.version.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str) -> PeerInfo {
        PeerInfo {
            peer_id: id.to_string(),
            ..PeerInfo::default()
        }
    }

    #[tokio::test]
    async fn test_static_node_health_counts_peers() {
        let node = StaticNode::new(NodeSnapshot {
            peers: vec![peer("a"), peer("b")],
            ..NodeSnapshot::default()
        });
        assert_eq!(node.health().await.unwrap().peers, 2);
    }

    #[tokio::test]
    async fn test_unavailable_node_fails_every_query() {
        let node = Arc::new(StaticNode::unavailable("stopped"));
        let system = SystemModule::new(node.clone(), node);

        assert_eq!(
            system.health().await,
            Err(NodeStatusError::Unavailable("stopped".to_string()))
        );
        assert!(system.peers().await.is_err());
        assert!(system.runtime_info().await.is_err());
    }
}
