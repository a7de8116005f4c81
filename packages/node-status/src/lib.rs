//! EdgeStore Node Status - Read-only Node Facade
//!
//! Health, network state and peer queries over a node, plus runtime
//! identity. Pure queries: nothing here mutates the node, and the only
//! failure mode is the node being unavailable.
//!
//! # Modules
//!
//! - [`status`] - `Health`, `NetworkState`, `PeerInfo` payloads
//! - [`facade`] - capability traits, `SystemModule` and `StaticNode`
//! - [`error`] - `NodeStatusError`

pub mod error;
pub mod facade;
pub mod status;

// Re-export main types
pub use error::{NodeStatusError, Result};
pub use facade::{NetworkApi, NodeSnapshot, RuntimeApi, RuntimeInfo, StaticNode, SystemModule};
pub use status::{Health, NetworkState, PeerInfo};
