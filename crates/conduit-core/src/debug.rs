//! Read-only inspection feed for network visualisation.
//!
//! Viewers subscribe per resource type. Each poll produces one trace per
//! live network of a watched type, listing a point per bridge and a point
//! per endpoint face joined to that network, coloured by network.

use std::collections::{BTreeMap, BTreeSet};

use slotmap::Key;

use crate::direction::Direction;
use crate::id::{BlockPos, NetworkId, NodeId, ResourceType};
use crate::manager::NetworkManager;
use crate::node::NodeKind;

/// Identifies a subscriber to the feed (a player, a tool window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugPoint {
    pub node: NodeId,
    pub pos: BlockPos,
    /// The endpoint face joined to the network; `None` for bridges.
    pub direction: Option<Direction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkTrace {
    pub network: NetworkId,
    pub resource: ResourceType,
    /// `0xRRGGBB`, stable for the lifetime of the network.
    pub color: u32,
    pub points: Vec<DebugPoint>,
}

#[derive(Debug, Clone, Default)]
pub struct DebugFeed {
    viewers: BTreeMap<ResourceType, BTreeSet<ViewerId>>,
}

impl DebugFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe or unsubscribe `viewer` for `resource`. Returns whether the
    /// viewer is subscribed afterwards.
    pub fn toggle_viewer(&mut self, viewer: ViewerId, resource: ResourceType) -> bool {
        let viewers = self.viewers.entry(resource).or_default();
        if viewers.remove(&viewer) {
            false
        } else {
            viewers.insert(viewer);
            true
        }
    }

    pub fn viewers(&self, resource: ResourceType) -> impl Iterator<Item = ViewerId> + '_ {
        self.viewers.get(&resource).into_iter().flatten().copied()
    }

    pub fn is_watched(&self, resource: ResourceType) -> bool {
        self.viewers.get(&resource).is_some_and(|v| !v.is_empty())
    }

    /// Trace every network of a watched type.
    pub fn poll(&self, manager: &NetworkManager) -> Vec<NetworkTrace> {
        if !ResourceType::ALL.into_iter().any(|r| self.is_watched(r)) {
            return Vec::new();
        }

        manager
            .networks()
            .filter(|(_, network)| self.is_watched(network.resource()))
            .map(|(id, network)| {
                let resource = network.resource();
                let mut points = Vec::new();
                for node_id in network.nodes() {
                    let Some(node) = manager.node(*node_id) else {
                        continue;
                    };
                    match node.kind() {
                        NodeKind::Bridge(_) => points.push(DebugPoint {
                            node: *node_id,
                            pos: node.pos(),
                            direction: None,
                        }),
                        NodeKind::EndPoint(end_point) => {
                            points.extend(end_point.networks(resource).filter(|(_, n)| *n == id).map(|(d, _)| {
                                DebugPoint {
                                    node: *node_id,
                                    pos: node.pos(),
                                    direction: Some(d),
                                }
                            }));
                        }
                    }
                }
                NetworkTrace {
                    network: id,
                    resource,
                    color: network_color(id),
                    points,
                }
            })
            .collect()
    }
}

/// A 24-bit colour hashed (FNV-1a) from the network id.
pub fn network_color(id: NetworkId) -> u32 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for b in id.data().as_ffi().to_le_bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash as u32) & 0x00ff_ffff
}
