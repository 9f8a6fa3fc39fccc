//! Network nodes: bridges route a resource, endpoints terminate it.
//!
//! A node is a closed sum over the two capabilities. Each node also keeps,
//! per resource type, a `Direction -> NodeId` map of the neighbours it is
//! connected to. That map is a lookup structure kept symmetric by the
//! manager; it does not own anything.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::direction::{Direction, DirectionSet};
use crate::holder::{ConnectionType, EnergyHolder, FluidHolder, ItemHolder};
use crate::id::{BlockPos, NetworkId, NodeId, ResourceType};

// ---------------------------------------------------------------------------
// Transfer rates
// ---------------------------------------------------------------------------

/// Per-tick transfer ceilings a bridge imposes on the networks it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferRates {
    pub energy: u64,
    pub item: u32,
    pub fluid: u64,
}

impl TransferRates {
    pub const UNLIMITED: TransferRates = TransferRates {
        energy: u64::MAX,
        item: u32::MAX,
        fluid: u64::MAX,
    };

    pub fn for_resource(&self, resource: ResourceType) -> u64 {
        match resource {
            ResourceType::Energy => self.energy,
            ResourceType::Item => u64::from(self.item),
            ResourceType::Fluid => self.fluid,
        }
    }
}

impl Default for TransferRates {
    fn default() -> Self {
        Self::UNLIMITED
    }
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

/// A routing-only node, such as a cable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bridge {
    supported: BTreeSet<ResourceType>,
    faces: DirectionSet,
    rates: TransferRates,
    pub(crate) networks: BTreeMap<ResourceType, NetworkId>,
}

impl Bridge {
    /// A bridge carrying every resource type on all six faces.
    pub fn new(rates: TransferRates) -> Self {
        Self {
            supported: ResourceType::ALL.into_iter().collect(),
            faces: DirectionSet::ALL,
            rates,
            networks: BTreeMap::new(),
        }
    }

    /// Restrict the resource types this bridge carries.
    pub fn with_resources(mut self, resources: &[ResourceType]) -> Self {
        self.supported = resources.iter().copied().collect();
        self
    }

    /// Restrict the faces this bridge connects on.
    pub fn with_faces(mut self, faces: DirectionSet) -> Self {
        self.faces = faces;
        self
    }

    pub fn supports(&self, resource: ResourceType) -> bool {
        self.supported.contains(&resource)
    }

    pub fn supported(&self) -> impl Iterator<Item = ResourceType> + '_ {
        self.supported.iter().copied()
    }

    pub fn faces(&self) -> DirectionSet {
        self.faces
    }

    pub(crate) fn faces_mut(&mut self) -> &mut DirectionSet {
        &mut self.faces
    }

    pub fn rates(&self) -> TransferRates {
        self.rates
    }

    /// The network this bridge belongs to for `resource`, if any.
    pub fn network(&self, resource: ResourceType) -> Option<NetworkId> {
        self.networks.get(&resource).copied()
    }

    /// Whether this bridge links to `other` through `face` for `resource`.
    pub fn can_connect(&self, other: &Bridge, resource: ResourceType, face: Direction) -> bool {
        self.supports(resource)
            && other.supports(resource)
            && self.faces.contains(face)
            && other.faces.contains(face.opposite())
    }
}

// ---------------------------------------------------------------------------
// EndPoint
// ---------------------------------------------------------------------------

/// A terminal node owning resource holders (a machine, battery, chest, tank).
#[derive(Default)]
pub struct EndPoint {
    passive: bool,
    allowed: BTreeMap<ResourceType, DirectionSet>,
    energy: Option<Box<dyn EnergyHolder>>,
    item: Option<Box<dyn ItemHolder>>,
    fluid: Option<Box<dyn FluidHolder>>,
    pub(crate) networks: BTreeMap<ResourceType, BTreeMap<Direction, NetworkId>>,
}

impl EndPoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an energy holder. Its allowed faces default to every face the
    /// holder does not configure as [`ConnectionType::None`].
    pub fn with_energy(mut self, holder: impl EnergyHolder + 'static) -> Self {
        let faces = Direction::ALL
            .into_iter()
            .filter(|d| holder.connection(*d) != ConnectionType::None)
            .collect();
        self.allowed.insert(ResourceType::Energy, faces);
        self.energy = Some(Box::new(holder));
        self
    }

    pub fn with_item(mut self, holder: impl ItemHolder + 'static) -> Self {
        let faces = Direction::ALL
            .into_iter()
            .filter(|d| holder.connection(*d) != ConnectionType::None)
            .collect();
        self.allowed.insert(ResourceType::Item, faces);
        self.item = Some(Box::new(holder));
        self
    }

    pub fn with_fluid(mut self, holder: impl FluidHolder + 'static) -> Self {
        let faces = Direction::ALL
            .into_iter()
            .filter(|d| holder.connection(*d) != ConnectionType::None)
            .collect();
        self.allowed.insert(ResourceType::Fluid, faces);
        self.fluid = Some(Box::new(holder));
        self
    }

    /// Override the faces on which this endpoint accepts `resource` connections.
    pub fn with_allowed_faces(mut self, resource: ResourceType, faces: DirectionSet) -> Self {
        self.allowed.insert(resource, faces);
        self
    }

    /// Mark this endpoint as passive. Two passive endpoints never form a
    /// network with each other.
    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    pub fn is_passive(&self) -> bool {
        self.passive
    }

    /// Faces accepting `resource`, or `None` if the endpoint does not take
    /// part in networks of that type.
    pub fn allowed_faces(&self, resource: ResourceType) -> Option<DirectionSet> {
        self.allowed.get(&resource).copied()
    }

    /// The holder's role for `resource` at `direction`.
    pub fn connection(&self, resource: ResourceType, direction: Direction) -> ConnectionType {
        match resource {
            ResourceType::Energy => self.energy.as_ref().map(|h| h.connection(direction)),
            ResourceType::Item => self.item.as_ref().map(|h| h.connection(direction)),
            ResourceType::Fluid => self.fluid.as_ref().map(|h| h.connection(direction)),
        }
        .unwrap_or_default()
    }

    pub fn has_holder(&self, resource: ResourceType) -> bool {
        match resource {
            ResourceType::Energy => self.energy.is_some(),
            ResourceType::Item => self.item.is_some(),
            ResourceType::Fluid => self.fluid.is_some(),
        }
    }

    /// Change the holder's role for `resource` at `direction`. The allowed
    /// faces follow: [`ConnectionType::None`] closes the face, any other
    /// role opens it. Returns `false` without a holder for `resource`.
    pub(crate) fn set_connection(
        &mut self,
        resource: ResourceType,
        direction: Direction,
        connection: ConnectionType,
    ) -> bool {
        let updated = match resource {
            ResourceType::Energy => self.energy.as_deref_mut().map(|h| h.set_connection(direction, connection)),
            ResourceType::Item => self.item.as_deref_mut().map(|h| h.set_connection(direction, connection)),
            ResourceType::Fluid => self.fluid.as_deref_mut().map(|h| h.set_connection(direction, connection)),
        }
        .is_some();
        if updated {
            let faces = self.allowed.entry(resource).or_default();
            if connection == ConnectionType::None {
                faces.remove(direction);
            } else {
                faces.insert(direction);
            }
        }
        updated
    }

    pub fn energy_holder(&self) -> Option<&dyn EnergyHolder> {
        self.energy.as_deref()
    }

    pub fn energy_holder_mut(&mut self) -> Option<&mut (dyn EnergyHolder + 'static)> {
        self.energy.as_deref_mut()
    }

    pub fn item_holder(&self) -> Option<&dyn ItemHolder> {
        self.item.as_deref()
    }

    pub fn item_holder_mut(&mut self) -> Option<&mut (dyn ItemHolder + 'static)> {
        self.item.as_deref_mut()
    }

    pub fn fluid_holder(&self) -> Option<&dyn FluidHolder> {
        self.fluid.as_deref()
    }

    pub fn fluid_holder_mut(&mut self) -> Option<&mut (dyn FluidHolder + 'static)> {
        self.fluid.as_deref_mut()
    }

    /// Networks this endpoint belongs to for `resource`, keyed by face.
    pub fn networks(&self, resource: ResourceType) -> impl Iterator<Item = (Direction, NetworkId)> + '_ {
        self.networks
            .get(&resource)
            .into_iter()
            .flat_map(|faces| faces.iter().map(|(d, n)| (*d, *n)))
    }

    pub(crate) fn set_network(&mut self, resource: ResourceType, face: Direction, network: NetworkId) {
        self.networks.entry(resource).or_default().insert(face, network);
    }

    pub(crate) fn remove_network(&mut self, resource: ResourceType, face: Direction) {
        if let Some(faces) = self.networks.get_mut(&resource) {
            faces.remove(&face);
            if faces.is_empty() {
                self.networks.remove(&resource);
            }
        }
    }
}

impl fmt::Debug for EndPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndPoint")
            .field("passive", &self.passive)
            .field("allowed", &self.allowed)
            .field("energy", &self.energy.is_some())
            .field("item", &self.item.is_some())
            .field("fluid", &self.fluid.is_some())
            .field("networks", &self.networks)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// The capability variant of a node.
#[derive(Debug)]
pub enum NodeKind {
    Bridge(Bridge),
    EndPoint(EndPoint),
}

/// A registered node: its position, its capability, and its adjacency.
#[derive(Debug)]
pub struct Node {
    pos: BlockPos,
    pub(crate) kind: NodeKind,
    pub(crate) connected: BTreeMap<ResourceType, BTreeMap<Direction, NodeId>>,
}

impl Node {
    pub(crate) fn new(pos: BlockPos, kind: NodeKind) -> Self {
        Self {
            pos,
            kind,
            connected: BTreeMap::new(),
        }
    }

    pub fn pos(&self) -> BlockPos {
        self.pos
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_bridge(&self) -> bool {
        matches!(self.kind, NodeKind::Bridge(_))
    }

    pub fn as_bridge(&self) -> Option<&Bridge> {
        match &self.kind {
            NodeKind::Bridge(bridge) => Some(bridge),
            NodeKind::EndPoint(_) => None,
        }
    }

    pub(crate) fn as_bridge_mut(&mut self) -> Option<&mut Bridge> {
        match &mut self.kind {
            NodeKind::Bridge(bridge) => Some(bridge),
            NodeKind::EndPoint(_) => None,
        }
    }

    pub fn as_end_point(&self) -> Option<&EndPoint> {
        match &self.kind {
            NodeKind::EndPoint(end_point) => Some(end_point),
            NodeKind::Bridge(_) => None,
        }
    }

    pub(crate) fn as_end_point_mut(&mut self) -> Option<&mut EndPoint> {
        match &mut self.kind {
            NodeKind::EndPoint(end_point) => Some(end_point),
            NodeKind::Bridge(_) => None,
        }
    }

    /// The neighbour connected at `direction` for `resource`.
    pub fn connected_at(&self, resource: ResourceType, direction: Direction) -> Option<NodeId> {
        self.connected.get(&resource).and_then(|m| m.get(&direction)).copied()
    }

    /// All neighbours connected for `resource`, in direction order.
    pub fn connected(&self, resource: ResourceType) -> impl Iterator<Item = (Direction, NodeId)> + '_ {
        self.connected
            .get(&resource)
            .into_iter()
            .flat_map(|m| m.iter().map(|(d, n)| (*d, *n)))
    }

    /// Every `(resource, direction, neighbour)` connection of this node.
    pub fn connections(&self) -> impl Iterator<Item = (ResourceType, Direction, NodeId)> + '_ {
        self.connected
            .iter()
            .flat_map(|(r, m)| m.iter().map(move |(d, n)| (*r, *d, *n)))
    }

    /// Whether the node has any adjacency or network membership left.
    pub fn is_attached(&self) -> bool {
        let has_membership = match &self.kind {
            NodeKind::Bridge(bridge) => !bridge.networks.is_empty(),
            NodeKind::EndPoint(end_point) => !end_point.networks.is_empty(),
        };
        has_membership || self.connected.values().any(|m| !m.is_empty())
    }

    pub(crate) fn set_connected(&mut self, resource: ResourceType, direction: Direction, node: NodeId) {
        self.connected.entry(resource).or_default().insert(direction, node);
    }

    pub(crate) fn remove_connected(&mut self, resource: ResourceType, direction: Direction) {
        if let Some(faces) = self.connected.get_mut(&resource) {
            faces.remove(&direction);
            if faces.is_empty() {
                self.connected.remove(&resource);
            }
        }
    }

    /// Rewrite every membership of `resource` pointing at one of `from` to `to`.
    pub(crate) fn move_membership(&mut self, resource: ResourceType, from: &[NetworkId], to: NetworkId) {
        match &mut self.kind {
            NodeKind::Bridge(bridge) => {
                if let Some(current) = bridge.networks.get_mut(&resource) {
                    if from.contains(current) {
                        *current = to;
                    }
                }
            }
            NodeKind::EndPoint(end_point) => {
                if let Some(faces) = end_point.networks.get_mut(&resource) {
                    for network in faces.values_mut() {
                        if from.contains(network) {
                            *network = to;
                        }
                    }
                }
            }
        }
    }

    /// Drop every membership of `resource` pointing at `network`.
    pub(crate) fn clear_membership(&mut self, resource: ResourceType, network: NetworkId) {
        match &mut self.kind {
            NodeKind::Bridge(bridge) => {
                if bridge.networks.get(&resource) == Some(&network) {
                    bridge.networks.remove(&resource);
                }
            }
            NodeKind::EndPoint(end_point) => {
                if let Some(faces) = end_point.networks.get_mut(&resource) {
                    faces.retain(|_, n| *n != network);
                    if faces.is_empty() {
                        end_point.networks.remove(&resource);
                    }
                }
            }
        }
    }
}
