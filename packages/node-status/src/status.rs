//! Node status payloads returned by the facade
use serde::{Deserialize, Serialize};

/// Connectivity summary of a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub peers: usize,
    pub is_syncing: bool,
    pub should_have_peers: bool,
}

impl Health {
    /// A node that expects peers but has none is isolated
    pub fn is_isolated(&self) -> bool {
        self.should_have_peers && self.peers == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub peer_id: String,
}

/// One connected peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub peer_id: String,
    pub roles: u8,
    pub protocol_version: u32,
    pub best_hash: String,
    pub best_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_health_serializes_camel_case() {
        let health = Health {
            peers: 2,
            is_syncing: true,
            should_have_peers: true,
        };
        assert_eq!(
            serde_json::to_value(&health).unwrap(),
            json!({"peers": 2, "isSyncing": true, "shouldHavePeers": true})
        );
    }

    #[test]
    fn test_isolation() {
        let mut health = Health {
            should_have_peers: true,
            ..Health::default()
        };
        assert!(health.is_isolated());
        health.peers = 1;
        assert!(!health.is_isolated());
        assert!(!Health::default().is_isolated());
    }

    #[test]
    fn test_peer_info_round_trips_json() {
        let peer: PeerInfo = serde_json::from_value(json!({
            "peerId": "QmPeer",
            "roles": 4,
            "protocolVersion": 2,
            "bestHash": "0xabc",
            "bestNumber": 42
        }))
        .unwrap();
        assert_eq!(peer.peer_id, "QmPeer");
        assert_eq!(peer.best_number, 42);
    }
}
