//! Networks: connected sets of nodes cooperating to move one resource.
//!
//! Every network shares the same membership bookkeeping ([`Members`]) and
//! validity rule. What happens on a tick depends on the resource:
//! [`EnergyNetwork`] and [`FluidNetwork`] settle stocks with the equal-share
//! algorithm from [`crate::share`], [`ItemNetwork`] moves stacks round-robin.

mod energy;
mod fluid;
mod item;

pub use energy::EnergyNetwork;
pub use fluid::FluidNetwork;
pub use item::{ItemNetwork, RoundRobinCounter};

use std::collections::BTreeSet;

use slotmap::SlotMap;

use crate::direction::Direction;
use crate::error::NetworkFault;
use crate::holder::ConnectionType;
use crate::id::{NetworkId, NodeId, ResourceType};
use crate::node::Node;
use crate::share::{self, Ledger, Settlement};

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

/// Role-classified membership of a network.
///
/// Role lists keep insertion order; that order is the "natural" order the
/// first-come fallback of the settlement walks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Members {
    nodes: BTreeSet<NodeId>,
    bridges: Vec<NodeId>,
    providers: Vec<NodeId>,
    consumers: Vec<NodeId>,
    buffers: Vec<NodeId>,
}

impl Members {
    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    pub fn bridges(&self) -> &[NodeId] {
        &self.bridges
    }

    pub fn providers(&self) -> &[NodeId] {
        &self.providers
    }

    pub fn consumers(&self) -> &[NodeId] {
        &self.consumers
    }

    pub fn buffers(&self) -> &[NodeId] {
        &self.buffers
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// A network is worth keeping if it has a bridge, or a provider and a
    /// consumer, or a buffer together with a provider or consumer.
    pub fn is_valid(&self) -> bool {
        let any_end = !self.providers.is_empty() || !self.consumers.is_empty();
        !self.bridges.is_empty()
            || (!self.providers.is_empty() && !self.consumers.is_empty())
            || (!self.buffers.is_empty() && any_end)
    }

    fn add_bridge(&mut self, node: NodeId) {
        self.nodes.insert(node);
        if !self.bridges.contains(&node) {
            self.bridges.push(node);
        }
    }

    /// Classify `node` by the role it plays on the face it joins through.
    /// Returns `false` for [`ConnectionType::None`].
    fn add_end_point(&mut self, node: NodeId, connection: ConnectionType) -> bool {
        match connection {
            ConnectionType::Provide => {
                if !self.buffers.contains(&node) {
                    if self.consumers.contains(&node) {
                        self.consumers.retain(|n| *n != node);
                        self.buffers.push(node);
                    } else if !self.providers.contains(&node) {
                        self.providers.push(node);
                    }
                }
            }
            ConnectionType::Consume => {
                if !self.buffers.contains(&node) {
                    if self.providers.contains(&node) {
                        self.providers.retain(|n| *n != node);
                        self.buffers.push(node);
                    } else if !self.consumers.contains(&node) {
                        self.consumers.push(node);
                    }
                }
            }
            ConnectionType::Buffer => {
                self.providers.retain(|n| *n != node);
                self.consumers.retain(|n| *n != node);
                if !self.buffers.contains(&node) {
                    self.buffers.push(node);
                }
            }
            ConnectionType::None => return false,
        }
        self.nodes.insert(node);
        true
    }

    fn remove_node(&mut self, node: NodeId) {
        self.nodes.remove(&node);
        self.bridges.retain(|n| *n != node);
        self.providers.retain(|n| *n != node);
        self.consumers.retain(|n| *n != node);
        self.buffers.retain(|n| *n != node);
    }

    fn add_all(&mut self, other: &Members) {
        for bridge in &other.bridges {
            self.add_bridge(*bridge);
        }
        for provider in &other.providers {
            self.add_end_point(*provider, ConnectionType::Provide);
        }
        for consumer in &other.consumers {
            self.add_end_point(*consumer, ConnectionType::Consume);
        }
        for buffer in &other.buffers {
            self.add_end_point(*buffer, ConnectionType::Buffer);
        }
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// A network of one resource type.
#[derive(Debug, Clone)]
pub enum Network {
    Energy(EnergyNetwork),
    Item(ItemNetwork),
    Fluid(FluidNetwork),
}

impl Network {
    /// An empty network for `resource`.
    pub fn new(resource: ResourceType) -> Self {
        match resource {
            ResourceType::Energy => Network::Energy(EnergyNetwork::default()),
            ResourceType::Item => Network::Item(ItemNetwork::default()),
            ResourceType::Fluid => Network::Fluid(FluidNetwork::default()),
        }
    }

    pub fn resource(&self) -> ResourceType {
        match self {
            Network::Energy(_) => ResourceType::Energy,
            Network::Item(_) => ResourceType::Item,
            Network::Fluid(_) => ResourceType::Fluid,
        }
    }

    pub fn members(&self) -> &Members {
        match self {
            Network::Energy(n) => &n.members,
            Network::Item(n) => &n.members,
            Network::Fluid(n) => &n.members,
        }
    }

    fn members_mut(&mut self) -> &mut Members {
        match self {
            Network::Energy(n) => &mut n.members,
            Network::Item(n) => &mut n.members,
            Network::Fluid(n) => &mut n.members,
        }
    }

    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        self.members().nodes()
    }

    pub fn add_bridge(&mut self, node: NodeId) {
        self.members_mut().add_bridge(node);
    }

    /// Add an endpoint joining through `face` with the holder role it has there.
    pub fn add_end_point(
        &mut self,
        node: NodeId,
        face: Direction,
        connection: ConnectionType,
    ) -> Result<(), NetworkFault> {
        let resource = self.resource();
        if self.members_mut().add_end_point(node, connection) {
            Ok(())
        } else {
            Err(NetworkFault::IllegalConnection {
                node,
                resource,
                direction: face,
            })
        }
    }

    pub fn remove_node(&mut self, node: NodeId) {
        self.members_mut().remove_node(node);
    }

    /// Absorb the membership of `other`, which must carry the same resource.
    pub fn add_all(&mut self, other: &Network) {
        debug_assert_eq!(self.resource(), other.resource(), "cannot merge networks of different types");
        self.members_mut().add_all(other.members());
    }

    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.members().is_valid()
    }

    /// Run one step of this network's resource policy.
    pub fn handle_tick(
        &mut self,
        id: NetworkId,
        nodes: &mut SlotMap<NodeId, Node>,
    ) -> Result<(), NetworkFault> {
        match self {
            Network::Energy(n) => n.handle_tick(id, nodes),
            Network::Item(n) => {
                n.handle_tick(id, nodes);
                Ok(())
            }
            Network::Fluid(n) => n.handle_tick(id, nodes),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared tick helpers
// ---------------------------------------------------------------------------

/// The tightest ceiling among the network's bridges, or unlimited without any.
pub(crate) fn transfer_rate(members: &Members, nodes: &SlotMap<NodeId, Node>, resource: ResourceType) -> u64 {
    members
        .bridges()
        .iter()
        .filter_map(|id| nodes.get(*id).and_then(Node::as_bridge))
        .map(|bridge| bridge.rates().for_resource(resource))
        .min()
        .unwrap_or(u64::MAX)
}

/// Read and write access to one stock-like holder type.
pub(crate) trait StockAccess {
    /// `(stored, requested)` of the node's holder.
    fn read(node: &Node) -> Option<(u64, u64)>;
    fn write(node: &mut Node, stored: u64);
}

/// Gather a ledger from the holders behind `A`, settle it and apply the result.
pub(crate) fn settle_members<A: StockAccess>(
    members: &Members,
    nodes: &mut SlotMap<NodeId, Node>,
    transfer_rate: u64,
) -> Result<Settlement, u64> {
    let read = |ids: &[NodeId], requested: bool| -> Vec<u64> {
        ids.iter()
            .map(|id| {
                nodes
                    .get(*id)
                    .and_then(A::read)
                    .map_or(0, |(stored, req)| if requested { req } else { stored })
            })
            .collect()
    };

    let ledger = Ledger {
        provider_stock: read(members.providers(), false),
        consumer_requests: read(members.consumers(), true),
        buffer_stock: read(members.buffers(), false),
        buffer_requests: read(members.buffers(), true),
    };

    let settlement = share::settle(&ledger, transfer_rate)?;

    apply::<A>(nodes, members.consumers(), &settlement.consumer_gain, true);
    apply::<A>(nodes, members.buffers(), &settlement.buffer_gain, true);
    apply::<A>(nodes, members.providers(), &settlement.provider_loss, false);
    apply::<A>(nodes, members.buffers(), &settlement.buffer_loss, false);

    Ok(settlement)
}

fn apply<A: StockAccess>(nodes: &mut SlotMap<NodeId, Node>, ids: &[NodeId], amounts: &[u64], gain: bool) {
    for (id, amount) in ids.iter().zip(amounts) {
        if *amount == 0 {
            continue;
        }
        if let Some(node) = nodes.get_mut(*id) {
            if let Some((stored, _)) = A::read(node) {
                let updated = if gain {
                    stored.saturating_add(*amount)
                } else {
                    stored.saturating_sub(*amount)
                };
                A::write(node, updated);
            }
        }
    }
}
