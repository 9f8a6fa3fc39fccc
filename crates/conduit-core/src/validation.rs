//! Consistency checks over a manager's graph.
//!
//! Used by tests and debug tooling to confirm the topology invariants hold
//! after a sequence of entry point calls.

use crate::direction::Direction;
use crate::id::{NetworkId, NodeId, ResourceType};
use crate::manager::NetworkManager;
use crate::node::NodeKind;

/// One broken invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// `node` records `other` at `direction`, but `other` does not record
    /// `node` at the opposite face.
    AsymmetricLink {
        node: NodeId,
        other: NodeId,
        resource: ResourceType,
        direction: Direction,
    },
    /// `node` records a neighbour that is not registered.
    DanglingLink {
        node: NodeId,
        resource: ResourceType,
        direction: Direction,
    },
    /// `node` claims membership of a network that is gone or lacks it.
    StaleMembership { node: NodeId, network: NetworkId },
    /// `network` lists `node` but the node does not record it.
    MissingMembership { node: NodeId, network: NetworkId },
    InvalidNetwork(NetworkId),
}

/// Every inconsistency in `manager`, in node then network order.
pub fn check_topology(manager: &NetworkManager) -> Vec<Inconsistency> {
    let mut problems = Vec::new();

    for (id, node) in manager.nodes() {
        for (resource, direction, other) in node.connections() {
            match manager.node(other) {
                None => problems.push(Inconsistency::DanglingLink {
                    node: id,
                    resource,
                    direction,
                }),
                Some(o) if o.connected_at(resource, direction.opposite()) != Some(id) => {
                    problems.push(Inconsistency::AsymmetricLink {
                        node: id,
                        other,
                        resource,
                        direction,
                    })
                }
                Some(_) => {}
            }
        }

        for resource in ResourceType::ALL {
            let claimed: Vec<NetworkId> = match node.kind() {
                NodeKind::Bridge(bridge) => bridge.network(resource).into_iter().collect(),
                NodeKind::EndPoint(end_point) => end_point.networks(resource).map(|(_, n)| n).collect(),
            };
            for network in claimed {
                let holds = manager
                    .network(network)
                    .is_some_and(|n| n.resource() == resource && n.members().contains(id));
                if !holds {
                    problems.push(Inconsistency::StaleMembership { node: id, network });
                }
            }
        }
    }

    for (network_id, network) in manager.networks() {
        if !network.is_valid() {
            problems.push(Inconsistency::InvalidNetwork(network_id));
        }
        for member in network.nodes() {
            if records_network(manager, *member, network.resource(), network_id) {
                continue;
            }
            problems.push(Inconsistency::MissingMembership {
                node: *member,
                network: network_id,
            });
        }
    }

    problems
}

/// Whether `node` records `network` for `resource` on any face.
fn records_network(manager: &NetworkManager, node: NodeId, resource: ResourceType, network: NetworkId) -> bool {
    match manager.node(node).map(|n| n.kind()) {
        Some(NodeKind::Bridge(bridge)) => bridge.network(resource) == Some(network),
        Some(NodeKind::EndPoint(end_point)) => end_point.networks(resource).any(|(_, n)| n == network),
        None => false,
    }
}
