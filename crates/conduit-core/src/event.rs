//! Topology events buffered by the manager.
//!
//! Every entry point appends to the manager's queue; the embedding system
//! drains it with [`crate::manager::NetworkManager::drain_events`] after the
//! call returns. `BridgeRefreshed` is the notification a bridge uses to redraw
//! its attachments. The other variants describe how the set of live networks
//! changed.

use crate::id::{NetworkId, NodeId, ResourceType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// A bridge's surroundings changed and it should re-read its connections.
    BridgeRefreshed { node: NodeId, tick: u64 },

    // -- Network lifecycle --
    NetworkCreated {
        network: NetworkId,
        resource: ResourceType,
    },
    /// Several networks were folded into the new network `into`.
    NetworkMerged {
        into: NetworkId,
        absorbed: Vec<NetworkId>,
    },
    /// `from` was removed and its remaining members regrouped into `into`.
    NetworkSplit {
        from: NetworkId,
        into: Vec<NetworkId>,
    },
    NetworkDestroyed { network: NetworkId },
}

impl NetworkEvent {
    /// The bridge to refresh, if this is a refresh notification.
    pub fn refreshed_bridge(&self) -> Option<NodeId> {
        match self {
            NetworkEvent::BridgeRefreshed { node, .. } => Some(*node),
            _ => None,
        }
    }
}
