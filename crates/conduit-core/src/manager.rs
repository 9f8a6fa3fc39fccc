//! The network manager: the node graph, the live networks and the four
//! topology entry points.
//!
//! # Entry points
//!
//! The embedding system translates world events into calls on
//! [`NetworkManager`]: register a node with [`NetworkManager::insert_bridge`]
//! or [`NetworkManager::insert_end_point`], then announce it with
//! [`NetworkManager::handle_bridge_add`] or
//! [`NetworkManager::handle_end_point_add`]. Removal is the reverse:
//! `handle_*_remove` detaches the node, [`NetworkManager::forget_node`] drops
//! it.
//!
//! # Invariants
//!
//! After every entry point returns:
//!
//! - Adjacency is symmetric: if A records B at direction D for a resource, B
//!   records A at `D.opposite()` for that resource.
//! - Every live network is valid, and every node belongs to at most one
//!   network per resource (endpoints: per resource and face).
//! - Every membership a node records points at a live network containing it.
//!
//! [`crate::validation::check_topology`] verifies all of the above.

use std::collections::{BTreeSet, HashMap, VecDeque};

use slotmap::SlotMap;
use tracing::{debug, warn};

use crate::config::ManagerSettings;
use crate::direction::Direction;
use crate::error::NetworkFault;
use crate::event::NetworkEvent;
use crate::holder::{ConnectionType, EnergyHolder, FluidHolder, ItemHolder};
use crate::id::{BlockPos, NetworkId, NodeId, ResourceType};
use crate::network::Network;
use crate::node::{Bridge, EndPoint, Node, NodeKind};

// ---------------------------------------------------------------------------
// Neighbour lookup
// ---------------------------------------------------------------------------

/// Answers which positions border a position, and through which face.
///
/// The manager never decides where nodes are in space; it resolves the
/// positions returned here through its position index.
pub trait NeighborLookup: Send {
    fn neighbors(&self, pos: BlockPos) -> Vec<(Direction, BlockPos)>;
}

/// The six face-adjacent blocks in the same world.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdjacentBlocks;

impl NeighborLookup for AdjacentBlocks {
    fn neighbors(&self, pos: BlockPos) -> Vec<(Direction, BlockPos)> {
        Direction::ALL.into_iter().map(|d| (d, pos.offset(d))).collect()
    }
}

// ---------------------------------------------------------------------------
// NetworkManager
// ---------------------------------------------------------------------------

/// What a freshly added endpoint does with one of its neighbours.
enum Attach {
    Join(NetworkId),
    Pair,
    Skip,
}

pub struct NetworkManager {
    nodes: SlotMap<NodeId, Node>,
    positions: HashMap<BlockPos, NodeId>,
    networks: SlotMap<NetworkId, Network>,
    lookup: Box<dyn NeighborLookup>,
    settings: ManagerSettings,
    current_tick: u64,
    events: Vec<NetworkEvent>,
}

impl std::fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkManager")
            .field("nodes", &self.nodes.len())
            .field("networks", &self.networks.len())
            .field("settings", &self.settings)
            .field("current_tick", &self.current_tick)
            .finish()
    }
}

impl Default for NetworkManager {
    fn default() -> Self {
        Self::new(ManagerSettings::default())
    }
}

impl NetworkManager {
    pub fn new(settings: ManagerSettings) -> Self {
        Self::with_lookup(AdjacentBlocks, settings)
    }

    /// A manager resolving neighbours through `lookup`.
    pub fn with_lookup(lookup: impl NeighborLookup + 'static, settings: ManagerSettings) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            positions: HashMap::new(),
            networks: SlotMap::with_key(),
            lookup: Box::new(lookup),
            settings,
            current_tick: 0,
            events: Vec::new(),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Number of ticks run so far.
    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    pub fn insert_bridge(&mut self, pos: BlockPos, bridge: Bridge) -> Result<NodeId, NetworkFault> {
        self.insert_node(pos, NodeKind::Bridge(bridge))
    }

    pub fn insert_end_point(&mut self, pos: BlockPos, end_point: EndPoint) -> Result<NodeId, NetworkFault> {
        self.insert_node(pos, NodeKind::EndPoint(end_point))
    }

    fn insert_node(&mut self, pos: BlockPos, kind: NodeKind) -> Result<NodeId, NetworkFault> {
        if self.positions.contains_key(&pos) {
            return Err(NetworkFault::PositionOccupied(pos));
        }
        let id = self.nodes.insert(Node::new(pos, kind));
        self.positions.insert(pos, id);
        Ok(id)
    }

    /// Drop a node that has been detached with one of the remove entry
    /// points, handing it back with its holders.
    pub fn forget_node(&mut self, id: NodeId) -> Result<Node, NetworkFault> {
        let node = self.nodes.get(id).ok_or(NetworkFault::UnknownNode(id))?;
        if node.is_attached() {
            return Err(NetworkFault::StillAttached(id));
        }
        let pos = node.pos();
        self.positions.remove(&pos);
        self.nodes.remove(id).ok_or(NetworkFault::UnknownNode(id))
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_at(&self, pos: BlockPos) -> Option<NodeId> {
        self.positions.get(&pos).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn network(&self, id: NetworkId) -> Option<&Network> {
        self.networks.get(id)
    }

    pub fn networks(&self) -> impl Iterator<Item = (NetworkId, &Network)> + '_ {
        self.networks.iter()
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    /// The network `node` belongs to for `resource`. For an endpoint that
    /// joins several networks this is the one on its first face.
    pub fn network_of(&self, node: NodeId, resource: ResourceType) -> Option<NetworkId> {
        match self.nodes.get(node)?.kind() {
            NodeKind::Bridge(bridge) => bridge.network(resource),
            NodeKind::EndPoint(end_point) => end_point.networks(resource).next().map(|(_, n)| n),
        }
    }

    pub fn energy_holder(&self, node: NodeId) -> Option<&dyn EnergyHolder> {
        self.nodes.get(node)?.as_end_point()?.energy_holder()
    }

    pub fn energy_holder_mut(&mut self, node: NodeId) -> Option<&mut (dyn EnergyHolder + 'static)> {
        self.nodes.get_mut(node)?.as_end_point_mut()?.energy_holder_mut()
    }

    pub fn fluid_holder(&self, node: NodeId) -> Option<&dyn FluidHolder> {
        self.nodes.get(node)?.as_end_point()?.fluid_holder()
    }

    pub fn fluid_holder_mut(&mut self, node: NodeId) -> Option<&mut (dyn FluidHolder + 'static)> {
        self.nodes.get_mut(node)?.as_end_point_mut()?.fluid_holder_mut()
    }

    pub fn item_holder(&self, node: NodeId) -> Option<&dyn ItemHolder> {
        self.nodes.get(node)?.as_end_point()?.item_holder()
    }

    pub fn item_holder_mut(&mut self, node: NodeId) -> Option<&mut (dyn ItemHolder + 'static)> {
        self.nodes.get_mut(node)?.as_end_point_mut()?.item_holder_mut()
    }

    /// Take every event buffered since the last drain.
    pub fn drain_events(&mut self) -> Vec<NetworkEvent> {
        std::mem::take(&mut self.events)
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Connect an endpoint to adjacent bridge networks, and form local
    /// networks with adjacent endpoints where the pair would be valid.
    ///
    /// With `update_bridges`, every bridge whose network gained the endpoint
    /// gets a refresh notification.
    pub fn handle_end_point_add(&mut self, id: NodeId, update_bridges: bool) -> Result<(), NetworkFault> {
        let node = self.nodes.get(id).ok_or(NetworkFault::UnknownNode(id))?;
        let end_point = node.as_end_point().ok_or(NetworkFault::NotAnEndPoint(id))?;
        let passive = end_point.is_passive();
        let nearby = self.nearby(node.pos(), id);
        let mut refresh = Vec::new();

        for resource in ResourceType::ALL {
            let Some(allowed) = self.nodes.get(id).and_then(Node::as_end_point).and_then(|e| e.allowed_faces(resource))
            else {
                continue;
            };

            for &(face, neighbor) in &nearby {
                if !allowed.contains(face) || self.connected_at(id, resource, face).is_some() {
                    continue;
                }
                let opposite = face.opposite();
                if self.connected_at(neighbor, resource, opposite).is_some() {
                    continue;
                }

                let plan = match self.nodes.get(neighbor).map(Node::kind) {
                    Some(NodeKind::Bridge(bridge)) => match bridge.network(resource) {
                        Some(network) if bridge.faces().contains(opposite) => Attach::Join(network),
                        _ => Attach::Skip,
                    },
                    Some(NodeKind::EndPoint(other)) => {
                        let willing = other.allowed_faces(resource).is_some_and(|f| f.contains(opposite));
                        if willing && !(passive && other.is_passive()) {
                            Attach::Pair
                        } else {
                            Attach::Skip
                        }
                    }
                    None => Attach::Skip,
                };

                match plan {
                    Attach::Join(network) => {
                        self.join_end_point(id, resource, face, network)?;
                        self.link(id, face, neighbor, resource);
                        if !refresh.contains(&neighbor) {
                            refresh.push(neighbor);
                        }
                    }
                    Attach::Pair => {
                        let mut candidate = Network::new(resource);
                        candidate.add_end_point(id, face, self.connection(id, resource, face))?;
                        candidate.add_end_point(neighbor, opposite, self.connection(neighbor, resource, opposite))?;
                        if !candidate.is_valid() {
                            continue;
                        }
                        let network = self.register_network(candidate);
                        self.set_end_point_network(id, resource, face, network);
                        self.set_end_point_network(neighbor, resource, opposite, network);
                        self.link(id, face, neighbor, resource);
                    }
                    Attach::Skip => {}
                }
            }
        }

        debug!(node = ?id, joined = refresh.len(), "endpoint added");
        if update_bridges {
            self.refresh_bridges(refresh);
        }
        Ok(())
    }

    /// Connect a bridge to willing adjacent bridges, joining, creating or
    /// merging networks as needed, then attach adjacent endpoints.
    pub fn handle_bridge_add(&mut self, id: NodeId) -> Result<(), NetworkFault> {
        let node = self.nodes.get(id).ok_or(NetworkFault::UnknownNode(id))?;
        let bridge = node.as_bridge().ok_or(NetworkFault::NotABridge(id))?;
        let supported: Vec<ResourceType> = bridge.supported().filter(|r| bridge.network(*r).is_none()).collect();
        let faces = bridge.faces();
        let nearby = self.nearby(node.pos(), id);

        for resource in supported {
            let mut previous: Vec<NetworkId> = Vec::new();
            for &(face, other) in &nearby {
                let (Some(this), Some(that)) = (
                    self.nodes.get(id).and_then(Node::as_bridge),
                    self.nodes.get(other).and_then(Node::as_bridge),
                ) else {
                    continue;
                };
                if !this.can_connect(that, resource, face) {
                    continue;
                }
                // Bridges that are not fully set up yet have no network.
                if let Some(network) = that.network(resource) {
                    if !previous.contains(&network) {
                        previous.push(network);
                    }
                }
                self.link(id, face, other, resource);
            }

            let network = match previous.as_slice() {
                [] => self.register_network(Network::new(resource)),
                [only] => *only,
                _ => self.merge_networks(resource, &previous),
            };

            if let Some(net) = self.networks.get_mut(network) {
                net.add_bridge(id);
            }
            if let Some(bridge) = self.nodes.get_mut(id).and_then(Node::as_bridge_mut) {
                bridge.networks.insert(resource, network);
            }

            for &(face, other) in &nearby {
                if !faces.contains(face) {
                    continue;
                }
                let opposite = face.opposite();
                let willing = self
                    .nodes
                    .get(other)
                    .and_then(Node::as_end_point)
                    .and_then(|e| e.allowed_faces(resource))
                    .is_some_and(|f| f.contains(opposite));
                if !willing || self.connected_at(other, resource, opposite).is_some() {
                    continue;
                }
                self.join_end_point(other, resource, opposite, network)?;
                self.link(id, face, other, resource);
            }
        }

        debug!(node = ?id, "bridge added");
        let mut refresh: Vec<NodeId> = nearby
            .iter()
            .filter(|(_, n)| self.nodes.get(*n).is_some_and(Node::is_bridge))
            .map(|(_, n)| *n)
            .collect();
        refresh.push(id);
        self.refresh_bridges(refresh);
        Ok(())
    }

    /// Detach an endpoint from every neighbour and network. Networks left
    /// invalid are destroyed. Without `unloading`, adjacent bridges are
    /// refreshed.
    pub fn handle_end_point_remove(&mut self, id: NodeId, unloading: bool) -> Result<(), NetworkFault> {
        let node = self.nodes.get(id).ok_or(NetworkFault::UnknownNode(id))?;
        let end_point = node.as_end_point().ok_or(NetworkFault::NotAnEndPoint(id))?;
        let pos = node.pos();
        let mut memberships: Vec<(ResourceType, NetworkId)> = Vec::new();
        for resource in ResourceType::ALL {
            for (_, network) in end_point.networks(resource) {
                if !memberships.contains(&(resource, network)) {
                    memberships.push((resource, network));
                }
            }
        }

        self.unlink_all(id);
        if let Some(end_point) = self.nodes.get_mut(id).and_then(Node::as_end_point_mut) {
            end_point.networks.clear();
        }

        for (_, network) in memberships {
            let Some(net) = self.networks.get_mut(network) else {
                continue;
            };
            net.remove_node(id);
            if !net.is_valid() {
                self.destroy_network(network);
            }
        }

        debug!(node = ?id, unloading, "endpoint removed");
        if !unloading {
            let bridges = self.nearby_bridges(pos, id);
            self.refresh_bridges(bridges);
        }
        Ok(())
    }

    /// Detach a bridge. Adjacent endpoints lose the connection on the facing
    /// side; if the bridge joined several other bridges its network is split
    /// into the components that remain connected.
    pub fn handle_bridge_remove(&mut self, id: NodeId, unloading: bool) -> Result<(), NetworkFault> {
        let node = self.nodes.get(id).ok_or(NetworkFault::UnknownNode(id))?;
        let bridge = node.as_bridge().ok_or(NetworkFault::NotABridge(id))?;
        let pos = node.pos();
        let memberships: Vec<(ResourceType, NetworkId)> = bridge.networks.iter().map(|(r, n)| (*r, *n)).collect();

        for (resource, current) in memberships {
            let direct: Vec<(Direction, NodeId)> = self
                .nodes
                .get(id)
                .map(|n| n.connected(resource).collect())
                .unwrap_or_default();

            for &(face, other) in &direct {
                if self.nodes.get(other).is_some_and(Node::is_bridge) {
                    continue;
                }
                self.detach_end_point_face(other, resource, face.opposite(), current)?;
            }

            let bridges: Vec<(Direction, NodeId)> = direct
                .into_iter()
                .filter(|(_, n)| self.nodes.get(*n).is_some_and(Node::is_bridge))
                .collect();
            for &(face, other) in &bridges {
                if let Some(other) = self.nodes.get_mut(other) {
                    other.remove_connected(resource, face.opposite());
                }
            }

            if bridges.len() > 1 {
                self.split_network(id, resource, current, &bridges)?;
            } else if let Some(net) = self.networks.get_mut(current) {
                net.remove_node(id);
                if !net.is_valid() {
                    self.destroy_network(current);
                }
            }
        }

        // Neighbours announced after this bridge linked to it even if it
        // never joined a network itself.
        self.unlink_all(id);
        if let Some(bridge) = self.nodes.get_mut(id).and_then(Node::as_bridge_mut) {
            bridge.networks.clear();
        }

        debug!(node = ?id, unloading, "bridge removed");
        if !unloading {
            let bridges = self.nearby_bridges(pos, id);
            self.refresh_bridges(bridges);
        }
        Ok(())
    }

    /// Toggle one face of a bridge, as a wrench does: a face carrying a
    /// connection is disabled, a disabled face is enabled. The bridge is
    /// removed and re-added around the change. Enabled faces without a
    /// connection are left alone.
    pub fn reconfigure_bridge_face(&mut self, id: NodeId, face: Direction) -> Result<(), NetworkFault> {
        let node = self.nodes.get(id).ok_or(NetworkFault::UnknownNode(id))?;
        let bridge = node.as_bridge().ok_or(NetworkFault::NotABridge(id))?;
        let connected = ResourceType::ALL.into_iter().any(|r| node.connected_at(r, face).is_some());
        let enabled = bridge.faces().contains(face);
        if !connected && enabled {
            return Ok(());
        }

        self.handle_bridge_remove(id, false)?;
        if let Some(bridge) = self.nodes.get_mut(id).and_then(Node::as_bridge_mut) {
            if connected {
                bridge.faces_mut().remove(face);
            } else {
                bridge.faces_mut().insert(face);
            }
        }
        debug!(node = ?id, ?face, enabled = !connected, "bridge face reconfigured");
        self.handle_bridge_add(id)
    }

    /// Change an endpoint's role for `resource` on one face, as a side
    /// configuration screen does. The endpoint is detached, its holder is
    /// updated and it is attached again; adjacent bridges are refreshed once.
    pub fn reconfigure_end_point_face(
        &mut self,
        id: NodeId,
        resource: ResourceType,
        face: Direction,
        connection: ConnectionType,
    ) -> Result<(), NetworkFault> {
        let node = self.nodes.get(id).ok_or(NetworkFault::UnknownNode(id))?;
        let end_point = node.as_end_point().ok_or(NetworkFault::NotAnEndPoint(id))?;
        if !end_point.has_holder(resource) {
            return Err(NetworkFault::NoHolder { node: id, resource });
        }
        let pos = node.pos();

        self.handle_end_point_remove(id, true)?;
        if let Some(end_point) = self.nodes.get_mut(id).and_then(Node::as_end_point_mut) {
            end_point.set_connection(resource, face, connection);
        }
        self.handle_end_point_add(id, false)?;

        debug!(node = ?id, ?resource, ?face, ?connection, "endpoint face reconfigured");
        let bridges = self.nearby_bridges(pos, id);
        self.refresh_bridges(bridges);
        Ok(())
    }

    /// Run one step on every live network. Item networks only run when the
    /// step number is a multiple of the configured interval. The first fault
    /// aborts the rest of the step.
    pub fn tick(&mut self) -> Result<(), NetworkFault> {
        let tick = self.current_tick;
        self.current_tick += 1;
        let interval = self.settings.item_tick_interval.max(1);
        let run_items = tick % interval == 0;

        for (id, network) in self.networks.iter_mut() {
            if network.resource() == ResourceType::Item && !run_items {
                continue;
            }
            network.handle_tick(id, &mut self.nodes)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Graph helpers
    // -----------------------------------------------------------------------

    /// Registered nodes bordering `pos`, excluding `this`.
    fn nearby(&self, pos: BlockPos, this: NodeId) -> Vec<(Direction, NodeId)> {
        self.lookup
            .neighbors(pos)
            .into_iter()
            .filter_map(|(d, p)| self.positions.get(&p).map(|id| (d, *id)))
            .filter(|(_, id)| *id != this)
            .collect()
    }

    fn nearby_bridges(&self, pos: BlockPos, this: NodeId) -> Vec<NodeId> {
        self.nearby(pos, this)
            .into_iter()
            .map(|(_, id)| id)
            .filter(|id| self.nodes.get(*id).is_some_and(Node::is_bridge))
            .collect()
    }

    fn connected_at(&self, id: NodeId, resource: ResourceType, face: Direction) -> Option<NodeId> {
        self.nodes.get(id)?.connected_at(resource, face)
    }

    fn connection(&self, id: NodeId, resource: ResourceType, face: Direction) -> ConnectionType {
        self.nodes
            .get(id)
            .and_then(Node::as_end_point)
            .map_or(ConnectionType::None, |e| e.connection(resource, face))
    }

    /// Record `a --face--> b` and the mirrored `b --opposite--> a`.
    fn link(&mut self, a: NodeId, face: Direction, b: NodeId, resource: ResourceType) {
        if let Some(node) = self.nodes.get_mut(a) {
            node.set_connected(resource, face, b);
        }
        if let Some(node) = self.nodes.get_mut(b) {
            node.set_connected(resource, face.opposite(), a);
        }
    }

    /// Drop every link of `id`, on both sides, for every resource.
    fn unlink_all(&mut self, id: NodeId) {
        let links: Vec<(ResourceType, Direction, NodeId)> =
            self.nodes.get(id).map(|n| n.connections().collect()).unwrap_or_default();
        for (resource, direction, other) in links {
            if let Some(other) = self.nodes.get_mut(other) {
                if other.connected_at(resource, direction.opposite()) == Some(id) {
                    other.remove_connected(resource, direction.opposite());
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.connected.clear();
        }
    }

    fn set_end_point_network(&mut self, id: NodeId, resource: ResourceType, face: Direction, network: NetworkId) {
        if let Some(end_point) = self.nodes.get_mut(id).and_then(Node::as_end_point_mut) {
            end_point.set_network(resource, face, network);
        }
    }

    /// Add an endpoint to `network` through `face` and record the membership.
    fn join_end_point(
        &mut self,
        id: NodeId,
        resource: ResourceType,
        face: Direction,
        network: NetworkId,
    ) -> Result<(), NetworkFault> {
        let connection = self.connection(id, resource, face);
        if let Some(net) = self.networks.get_mut(network) {
            net.add_end_point(id, face, connection)?;
        }
        self.set_end_point_network(id, resource, face, network);
        Ok(())
    }

    /// Drop the endpoint's connection through `face` to a removed bridge.
    /// The endpoint stays in `network` with the roles of any other faces
    /// still joined to it.
    fn detach_end_point_face(
        &mut self,
        id: NodeId,
        resource: ResourceType,
        face: Direction,
        network: NetworkId,
    ) -> Result<(), NetworkFault> {
        let Some(node) = self.nodes.get_mut(id) else {
            return Ok(());
        };
        node.remove_connected(resource, face);
        let Some(end_point) = node.as_end_point_mut() else {
            return Ok(());
        };
        end_point.remove_network(resource, face);
        let remaining: Vec<(Direction, ConnectionType)> = end_point
            .networks(resource)
            .filter(|(_, n)| *n == network)
            .map(|(d, _)| (d, end_point.connection(resource, d)))
            .collect();

        if let Some(net) = self.networks.get_mut(network) {
            net.remove_node(id);
            for (direction, connection) in remaining {
                net.add_end_point(id, direction, connection)?;
            }
        }
        Ok(())
    }

    fn refresh_bridges(&mut self, bridges: Vec<NodeId>) {
        let mut seen = Vec::with_capacity(bridges.len());
        for bridge in bridges {
            if seen.contains(&bridge) {
                continue;
            }
            seen.push(bridge);
            self.events.push(NetworkEvent::BridgeRefreshed {
                node: bridge,
                tick: self.current_tick,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Network lifecycle
    // -----------------------------------------------------------------------

    fn register_network(&mut self, network: Network) -> NetworkId {
        let resource = network.resource();
        let id = self.networks.insert(network);
        debug!(network = ?id, ?resource, "network created");
        self.events.push(NetworkEvent::NetworkCreated { network: id, resource });
        id
    }

    /// Fold `previous` into one new network and repoint every member.
    fn merge_networks(&mut self, resource: ResourceType, previous: &[NetworkId]) -> NetworkId {
        let mut merged = Network::new(resource);
        let mut moved = BTreeSet::new();
        for id in previous {
            if let Some(old) = self.networks.remove(*id) {
                merged.add_all(&old);
                moved.extend(old.nodes().iter().copied());
            }
        }

        let into = self.networks.insert(merged);
        for node in moved {
            if let Some(node) = self.nodes.get_mut(node) {
                node.move_membership(resource, previous, into);
            }
        }

        debug!(network = ?into, absorbed = previous.len(), ?resource, "networks merged");
        self.events.push(NetworkEvent::NetworkMerged {
            into,
            absorbed: previous.to_vec(),
        });
        into
    }

    /// Remove `removed` from network `old` by regrouping what is still
    /// reachable from each of `starts` into fresh networks.
    fn split_network(
        &mut self,
        removed: NodeId,
        resource: ResourceType,
        old: NetworkId,
        starts: &[(Direction, NodeId)],
    ) -> Result<(), NetworkFault> {
        let Some(old_network) = self.networks.remove(old) else {
            warn!(network = ?old, "split of unknown network");
            return Ok(());
        };
        if let Some(node) = self.nodes.get_mut(removed) {
            node.clear_membership(resource, old);
        }

        let mut seen: Vec<BTreeSet<NodeId>> = Vec::new();
        let mut created = Vec::new();
        for &(_, start) in starts {
            let component = self.component(start, resource);
            let members: BTreeSet<NodeId> = component.iter().map(|(n, _)| *n).collect();
            let lone_end_point = members.len() == 1 && !self.nodes.get(start).is_some_and(Node::is_bridge);
            if lone_end_point || seen.contains(&members) {
                continue;
            }

            let mut network = Network::new(resource);
            for &(node, face) in &component {
                match face {
                    None => network.add_bridge(node),
                    Some(face) => network.add_end_point(node, face, self.connection(node, resource, face))?,
                }
            }
            let id = self.networks.insert(network);
            for &(node, face) in &component {
                match face {
                    None => {
                        if let Some(bridge) = self.nodes.get_mut(node).and_then(Node::as_bridge_mut) {
                            bridge.networks.insert(resource, id);
                        }
                    }
                    Some(face) => self.set_end_point_network(node, resource, face, id),
                }
            }
            seen.push(members);
            created.push(id);
        }

        // Anything not regrouped must not point at the old network.
        for node in old_network.nodes() {
            if let Some(node) = self.nodes.get_mut(*node) {
                node.clear_membership(resource, old);
            }
        }

        debug!(network = ?old, into = created.len(), ?resource, "network split");
        self.events.push(NetworkEvent::NetworkSplit { from: old, into: created });
        Ok(())
    }

    /// Nodes reachable from bridge `start` over `resource` links, expanding
    /// through bridges only. Endpoints carry the face they are reached on.
    fn component(&self, start: NodeId, resource: ResourceType) -> Vec<(NodeId, Option<Direction>)> {
        let mut visited = BTreeSet::from([start]);
        let mut end_points = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        let mut out = vec![(start, None)];

        while let Some(current) = queue.pop_front() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for (direction, next) in node.connected(resource) {
                let Some(next_node) = self.nodes.get(next) else {
                    continue;
                };
                if next_node.is_bridge() {
                    if visited.insert(next) {
                        out.push((next, None));
                        queue.push_back(next);
                    }
                } else {
                    let face = direction.opposite();
                    if end_points.insert((next, face)) {
                        out.push((next, Some(face)));
                    }
                }
            }
        }
        out
    }

    /// Remove a network and every trace of it on its former members.
    fn destroy_network(&mut self, id: NetworkId) {
        let Some(network) = self.networks.remove(id) else {
            return;
        };
        let resource = network.resource();
        for member in network.nodes() {
            let links: Vec<(Direction, NodeId)> = self
                .nodes
                .get(*member)
                .map(|n| n.connected(resource).filter(|(_, other)| network.members().contains(*other)).collect())
                .unwrap_or_default();
            for (direction, other) in links {
                if let Some(node) = self.nodes.get_mut(*member) {
                    node.remove_connected(resource, direction);
                }
                if let Some(node) = self.nodes.get_mut(other) {
                    node.remove_connected(resource, direction.opposite());
                }
            }
            if let Some(node) = self.nodes.get_mut(*member) {
                node.clear_membership(resource, id);
            }
        }
        debug!(network = ?id, ?resource, "network destroyed");
        self.events.push(NetworkEvent::NetworkDestroyed { network: id });
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::DirectionSet;
    use crate::holder::{EnergyCell, SideConfig};
    use crate::node::TransferRates;
    use crate::validation::check_topology;

    fn pos(x: i32) -> BlockPos {
        BlockPos::origin_world(x, 0, 0)
    }

    fn cable(m: &mut NetworkManager, x: i32) -> NodeId {
        let id = m
            .insert_bridge(pos(x), Bridge::new(TransferRates::UNLIMITED).with_resources(&[ResourceType::Energy]))
            .unwrap();
        m.handle_bridge_add(id).unwrap();
        id
    }

    fn cell(m: &mut NetworkManager, at: BlockPos, connection: ConnectionType, capacity: u64, energy: u64) -> NodeId {
        let end_point = EndPoint::new().with_energy(EnergyCell::new(capacity, energy, SideConfig::uniform(connection)));
        let id = m.insert_end_point(at, end_point).unwrap();
        m.handle_end_point_add(id, true).unwrap();
        id
    }

    fn assert_consistent(m: &NetworkManager) {
        let problems = check_topology(m);
        assert!(problems.is_empty(), "{problems:?}");
    }

    #[test]
    fn lone_bridge_creates_network() {
        let mut m = NetworkManager::default();
        let a = cable(&mut m, 0);
        assert_eq!(m.network_count(), 1);
        let net = m.network_of(a, ResourceType::Energy).unwrap();
        assert_eq!(m.network(net).unwrap().members().bridges(), &[a]);
        assert_consistent(&m);
    }

    #[test]
    fn adjacent_bridge_joins_existing_network() {
        let mut m = NetworkManager::default();
        let a = cable(&mut m, 0);
        let b = cable(&mut m, 1);
        assert_eq!(m.network_count(), 1);
        assert_eq!(m.network_of(a, ResourceType::Energy), m.network_of(b, ResourceType::Energy));
        assert_eq!(m.node(a).unwrap().connected_at(ResourceType::Energy, Direction::East), Some(b));
        assert_eq!(m.node(b).unwrap().connected_at(ResourceType::Energy, Direction::West), Some(a));
        assert_consistent(&m);
    }

    #[test]
    fn bridge_between_two_networks_merges_them() {
        let mut m = NetworkManager::default();
        let a = cable(&mut m, 0);
        let c = cable(&mut m, 2);
        let before: Vec<NetworkId> = m.networks().map(|(id, _)| id).collect();
        assert_eq!(before.len(), 2);
        m.drain_events();

        let b = cable(&mut m, 1);
        assert_eq!(m.network_count(), 1);
        let merged = m.network_of(b, ResourceType::Energy).unwrap();
        assert!(!before.contains(&merged));
        for old in &before {
            assert!(m.network(*old).is_none());
        }
        assert_eq!(m.network(merged).unwrap().nodes().len(), 3);
        assert_eq!(m.network_of(a, ResourceType::Energy), Some(merged));
        assert_eq!(m.network_of(c, ResourceType::Energy), Some(merged));

        let events = m.drain_events();
        assert!(events.iter().any(|e| matches!(e, NetworkEvent::NetworkMerged { into, absorbed }
            if *into == merged && absorbed.len() == 2)));
        assert_consistent(&m);
    }

    #[test]
    fn removing_middle_bridge_splits_network() {
        let mut m = NetworkManager::default();
        let a = cable(&mut m, 0);
        let b = cable(&mut m, 1);
        let c = cable(&mut m, 2);
        let old = m.network_of(b, ResourceType::Energy).unwrap();

        m.handle_bridge_remove(b, false).unwrap();
        m.forget_node(b).unwrap();

        assert_eq!(m.network_count(), 2);
        assert!(m.network(old).is_none());
        let na = m.network_of(a, ResourceType::Energy).unwrap();
        let nc = m.network_of(c, ResourceType::Energy).unwrap();
        assert_ne!(na, nc);
        assert_eq!(m.network(na).unwrap().nodes().len(), 1);
        assert_consistent(&m);
    }

    #[test]
    fn removing_bridge_in_a_loop_keeps_one_network() {
        // a b
        // d c   (square loop in the x/z plane)
        let mut m = NetworkManager::default();
        let bridge = || Bridge::new(TransferRates::UNLIMITED).with_resources(&[ResourceType::Energy]);
        let ids: Vec<NodeId> = [(0, 0), (1, 0), (1, 1), (0, 1)]
            .into_iter()
            .map(|(x, z)| {
                let id = m.insert_bridge(BlockPos::origin_world(x, 0, z), bridge()).unwrap();
                m.handle_bridge_add(id).unwrap();
                id
            })
            .collect();
        assert_eq!(m.network_count(), 1);

        m.handle_bridge_remove(ids[0], false).unwrap();
        assert_eq!(m.network_count(), 1);
        let net = m.network_of(ids[1], ResourceType::Energy).unwrap();
        assert_eq!(m.network(net).unwrap().nodes().len(), 3);
        assert_consistent(&m);
    }

    #[test]
    fn removing_unannounced_bridge_clears_neighbour_links() {
        let mut m = NetworkManager::default();
        let bridge = || Bridge::new(TransferRates::UNLIMITED).with_resources(&[ResourceType::Energy]);
        let a = m.insert_bridge(pos(0), bridge()).unwrap();
        let b = m.insert_bridge(pos(1), bridge()).unwrap();

        // Only `a` is announced, but it links to `b` anyway.
        m.handle_bridge_add(a).unwrap();
        assert_eq!(m.node(a).unwrap().connected_at(ResourceType::Energy, Direction::East), Some(b));

        m.handle_bridge_remove(b, true).unwrap();
        assert_consistent(&m);
        assert_eq!(m.node(a).unwrap().connected(ResourceType::Energy).count(), 0);

        m.forget_node(b).unwrap();
        assert_consistent(&m);
        assert_eq!(m.network_count(), 1);
    }

    #[test]
    fn end_point_joins_adjacent_bridge_and_refreshes_it() {
        let mut m = NetworkManager::default();
        let a = cable(&mut m, 0);
        m.drain_events();
        let machine = cell(&mut m, pos(1), ConnectionType::Consume, 100, 0);

        let net = m.network_of(a, ResourceType::Energy).unwrap();
        assert_eq!(m.network(net).unwrap().members().consumers(), &[machine]);
        let events = m.drain_events();
        assert_eq!(events.iter().filter_map(NetworkEvent::refreshed_bridge).collect::<Vec<_>>(), vec![a]);
        assert_consistent(&m);
    }

    #[test]
    fn bridge_attaches_existing_end_points() {
        let mut m = NetworkManager::default();
        let provider = cell(&mut m, pos(0), ConnectionType::Provide, 100, 100);
        let consumer = cell(&mut m, pos(2), ConnectionType::Consume, 100, 0);
        assert_eq!(m.network_count(), 0);

        let b = cable(&mut m, 1);
        let net = m.network_of(b, ResourceType::Energy).unwrap();
        let members = m.network(net).unwrap().members();
        assert_eq!(members.providers(), &[provider]);
        assert_eq!(members.consumers(), &[consumer]);
        assert_consistent(&m);
    }

    #[test]
    fn adjacent_provider_and_consumer_form_local_network() {
        let mut m = NetworkManager::default();
        let provider = cell(&mut m, pos(0), ConnectionType::Provide, 100, 100);
        let consumer = cell(&mut m, pos(1), ConnectionType::Consume, 100, 0);
        assert_eq!(m.network_count(), 1);
        assert_eq!(
            m.network_of(provider, ResourceType::Energy),
            m.network_of(consumer, ResourceType::Energy)
        );
        assert_consistent(&m);

        m.tick().unwrap();
        assert_eq!(m.energy_holder(consumer).unwrap().energy(), 100);
    }

    #[test]
    fn two_providers_never_form_network() {
        let mut m = NetworkManager::default();
        let a = cell(&mut m, pos(0), ConnectionType::Provide, 100, 100);
        let b = cell(&mut m, pos(1), ConnectionType::Provide, 100, 100);
        assert_eq!(m.network_count(), 0);
        assert!(!m.node(a).unwrap().is_attached());
        assert!(!m.node(b).unwrap().is_attached());
    }

    #[test]
    fn two_passive_end_points_never_pair() {
        let mut m = NetworkManager::default();
        let provider = EndPoint::new()
            .with_energy(EnergyCell::new(10, 10, SideConfig::uniform(ConnectionType::Provide)))
            .passive();
        let consumer = EndPoint::new()
            .with_energy(EnergyCell::new(10, 0, SideConfig::uniform(ConnectionType::Consume)))
            .passive();
        let p = m.insert_end_point(pos(0), provider).unwrap();
        let c = m.insert_end_point(pos(1), consumer).unwrap();
        m.handle_end_point_add(p, true).unwrap();
        m.handle_end_point_add(c, true).unwrap();
        assert_eq!(m.network_count(), 0);
    }

    #[test]
    fn removing_end_point_destroys_invalid_local_network() {
        let mut m = NetworkManager::default();
        let provider = cell(&mut m, pos(0), ConnectionType::Provide, 100, 100);
        let consumer = cell(&mut m, pos(1), ConnectionType::Consume, 100, 0);
        let net = m.network_of(provider, ResourceType::Energy).unwrap();
        m.drain_events();

        m.handle_end_point_remove(provider, false).unwrap();
        assert_eq!(m.network_count(), 0);
        assert!(!m.node(consumer).unwrap().is_attached());
        assert!(m.drain_events().contains(&NetworkEvent::NetworkDestroyed { network: net }));
        assert!(m.forget_node(provider).is_ok());
        assert_consistent(&m);
    }

    #[test]
    fn unloading_suppresses_refresh() {
        let mut m = NetworkManager::default();
        cable(&mut m, 0);
        let machine = cell(&mut m, pos(1), ConnectionType::Consume, 100, 0);
        m.drain_events();

        m.handle_end_point_remove(machine, true).unwrap();
        assert!(m.drain_events().iter().all(|e| e.refreshed_bridge().is_none()));
    }

    #[test]
    fn end_point_on_two_faces_of_one_network_survives_losing_one() {
        // The buffer at x=1 touches cables at x=0, x=2 and above it; all three
        // belong to one network through the row at y=1.
        let mut m = NetworkManager::default();
        let bridge = || Bridge::new(TransferRates::UNLIMITED).with_resources(&[ResourceType::Energy]);
        let add = |m: &mut NetworkManager, x, y| {
            let id = m.insert_bridge(BlockPos::origin_world(x, y, 0), bridge()).unwrap();
            m.handle_bridge_add(id).unwrap();
            id
        };
        let left = add(&mut m, 0, 0);
        add(&mut m, 0, 1);
        add(&mut m, 1, 1);
        add(&mut m, 2, 1);
        let right = add(&mut m, 2, 0);
        let provider = cell(&mut m, pos(1), ConnectionType::Buffer, 100, 50);
        assert_eq!(m.network_count(), 1);

        m.handle_bridge_remove(left, false).unwrap();
        let net = m.network_of(right, ResourceType::Energy).unwrap();
        assert!(m.network(net).unwrap().members().buffers().contains(&provider));
        let faces: Vec<_> = m.node(provider).unwrap().as_end_point().unwrap().networks(ResourceType::Energy).collect();
        assert_eq!(faces, vec![(Direction::East, net), (Direction::Up, net)]);
        assert_consistent(&m);
    }

    #[test]
    fn contract_violations_leave_state_untouched() {
        let mut m = NetworkManager::default();
        let a = cable(&mut m, 0);
        let machine = cell(&mut m, pos(1), ConnectionType::Consume, 10, 0);
        assert_eq!(m.handle_end_point_add(a, true), Err(NetworkFault::NotAnEndPoint(a)));
        assert_eq!(m.handle_bridge_remove(machine, false), Err(NetworkFault::NotABridge(machine)));
        assert_eq!(
            m.insert_bridge(pos(0), Bridge::new(TransferRates::UNLIMITED)),
            Err(NetworkFault::PositionOccupied(pos(0)))
        );
        assert_eq!(m.forget_node(a).map(|_| ()), Err(NetworkFault::StillAttached(a)));
        assert_eq!(m.network_count(), 1);
        assert_consistent(&m);
    }

    #[test]
    fn wrench_disables_then_enables_a_face() {
        let mut m = NetworkManager::default();
        let a = cable(&mut m, 0);
        let b = cable(&mut m, 1);
        assert_eq!(m.network_count(), 1);

        m.reconfigure_bridge_face(a, Direction::East).unwrap();
        assert!(!m.node(a).unwrap().as_bridge().unwrap().faces().contains(Direction::East));
        assert_eq!(m.network_count(), 2);
        assert_ne!(m.network_of(a, ResourceType::Energy), m.network_of(b, ResourceType::Energy));

        m.reconfigure_bridge_face(a, Direction::East).unwrap();
        assert_eq!(m.network_count(), 1);
        assert_eq!(m.network_of(a, ResourceType::Energy), m.network_of(b, ResourceType::Energy));
        assert_consistent(&m);

        // An enabled face with nothing on it is left alone.
        m.reconfigure_bridge_face(a, Direction::Up).unwrap();
        assert_eq!(m.node(a).unwrap().as_bridge().unwrap().faces(), DirectionSet::ALL);
    }

    #[test]
    fn end_point_face_flips_from_provider_to_consumer() {
        let mut m = NetworkManager::default();
        let cables: Vec<NodeId> = (0..3).map(|x| cable(&mut m, x)).collect();
        let provider = cell(&mut m, BlockPos::origin_world(0, 1, 0), ConnectionType::Provide, 100, 100);
        let machine = cell(&mut m, BlockPos::origin_world(2, 1, 0), ConnectionType::Provide, 100, 0);

        // Two providers and nobody asking.
        m.tick().unwrap();
        assert_eq!(m.energy_holder(machine).unwrap().energy(), 0);
        m.drain_events();

        m.reconfigure_end_point_face(machine, ResourceType::Energy, Direction::Down, ConnectionType::Consume)
            .unwrap();
        assert_consistent(&m);
        let net = m.network_of(cables[2], ResourceType::Energy).unwrap();
        assert_eq!(m.network_of(machine, ResourceType::Energy), Some(net));
        let members = m.network(net).unwrap().members();
        assert_eq!(members.providers(), &[provider]);
        assert_eq!(members.consumers(), &[machine]);
        let refreshed: Vec<NodeId> = m.drain_events().iter().filter_map(NetworkEvent::refreshed_bridge).collect();
        assert_eq!(refreshed, vec![cables[2]]);

        m.tick().unwrap();
        assert_eq!(m.energy_holder(machine).unwrap().energy(), 100);
        assert_eq!(m.energy_holder(provider).unwrap().energy(), 0);
    }

    #[test]
    fn closing_an_end_point_face_detaches_it() {
        let mut m = NetworkManager::default();
        let a = cable(&mut m, 0);
        let machine = cell(&mut m, pos(1), ConnectionType::Consume, 100, 0);

        m.reconfigure_end_point_face(machine, ResourceType::Energy, Direction::West, ConnectionType::None)
            .unwrap();
        assert!(m.network_of(machine, ResourceType::Energy).is_none());
        assert!(!m.node(machine).unwrap().is_attached());
        assert!(m.node(a).unwrap().connected_at(ResourceType::Energy, Direction::East).is_none());
        assert_consistent(&m);

        assert_eq!(
            m.reconfigure_end_point_face(machine, ResourceType::Fluid, Direction::West, ConnectionType::Consume),
            Err(NetworkFault::NoHolder {
                node: machine,
                resource: ResourceType::Fluid
            })
        );
        assert_eq!(
            m.reconfigure_end_point_face(a, ResourceType::Energy, Direction::East, ConnectionType::Consume),
            Err(NetworkFault::NotAnEndPoint(a))
        );
    }

    #[test]
    fn item_networks_tick_on_interval() {
        use crate::holder::{ItemBuffer, ItemStack};
        use crate::id::ItemTypeId;

        let settings = ManagerSettings {
            item_tick_interval: 3,
            ..ManagerSettings::default()
        };
        let mut m = NetworkManager::new(settings);
        let chest = |connection, count| {
            let mut buffer = ItemBuffer::new(64, SideConfig::uniform(connection));
            if count > 0 {
                buffer = buffer.with_stack(ItemStack::new(ItemTypeId(1), count));
            }
            EndPoint::new().with_item(buffer)
        };
        let source = m.insert_end_point(pos(0), chest(ConnectionType::Provide, 10)).unwrap();
        let sink = m.insert_end_point(pos(1), chest(ConnectionType::Consume, 0)).unwrap();
        m.handle_end_point_add(source, true).unwrap();
        m.handle_end_point_add(sink, true).unwrap();

        let count = |m: &NetworkManager| m.item_holder(sink).and_then(|h| h.peek()).map_or(0, |s| s.count);
        m.tick().unwrap();
        assert_eq!(count(&m), 10);

        m.item_holder_mut(sink).unwrap().take(ItemTypeId(1), 10);
        m.item_holder_mut(source).unwrap().insert(ItemTypeId(1), 5);
        m.tick().unwrap();
        m.tick().unwrap();
        assert_eq!(count(&m), 0);
        m.tick().unwrap();
        assert_eq!(count(&m), 5);
        assert_eq!(m.current_tick(), 4);
    }
}
