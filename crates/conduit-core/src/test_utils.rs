//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::holder::{ConnectionType, EnergyCell, FluidTank, ItemBuffer, ItemStack, SideConfig};
use crate::id::{BlockPos, ItemTypeId, NodeId, ResourceType};
use crate::manager::NetworkManager;
use crate::node::{Bridge, EndPoint, TransferRates};

// ===========================================================================
// Item constructors
// ===========================================================================

pub fn iron() -> ItemTypeId {
    ItemTypeId(0)
}
pub fn copper() -> ItemTypeId {
    ItemTypeId(1)
}

pub fn pos(x: i32, y: i32, z: i32) -> BlockPos {
    BlockPos::origin_world(x, y, z)
}

// ===========================================================================
// Node constructors
// ===========================================================================

/// A cable carrying only `resource`, with the given ceiling for it.
pub fn cable(resource: ResourceType, rate: u64) -> Bridge {
    let rates = TransferRates {
        energy: rate,
        item: u32::try_from(rate).unwrap_or(u32::MAX),
        fluid: rate,
    };
    Bridge::new(rates).with_resources(&[resource])
}

pub fn energy_cable(rate: u64) -> Bridge {
    cable(ResourceType::Energy, rate)
}

pub fn energy_cell(connection: ConnectionType, capacity: u64, energy: u64) -> EndPoint {
    EndPoint::new().with_energy(EnergyCell::new(capacity, energy, SideConfig::uniform(connection)))
}

pub fn fluid_tank(connection: ConnectionType, capacity: u64, amount: u64) -> EndPoint {
    EndPoint::new().with_fluid(FluidTank::new(capacity, amount, SideConfig::uniform(connection)))
}

pub fn chest(connection: ConnectionType, limit: u32, contents: Option<ItemStack>) -> EndPoint {
    let mut buffer = ItemBuffer::new(limit, SideConfig::uniform(connection));
    if let Some(stack) = contents {
        buffer = buffer.with_stack(stack);
    }
    EndPoint::new().with_item(buffer)
}

// ===========================================================================
// Manager helpers
// ===========================================================================

/// Register and announce a bridge.
pub fn add_bridge(manager: &mut NetworkManager, at: BlockPos, bridge: Bridge) -> NodeId {
    let id = manager.insert_bridge(at, bridge).unwrap();
    manager.handle_bridge_add(id).unwrap();
    id
}

/// Register and announce an endpoint, refreshing bridges.
pub fn add_end_point(manager: &mut NetworkManager, at: BlockPos, end_point: EndPoint) -> NodeId {
    let id = manager.insert_end_point(at, end_point).unwrap();
    manager.handle_end_point_add(id, true).unwrap();
    id
}

/// Detach and drop a bridge.
pub fn remove_bridge(manager: &mut NetworkManager, id: NodeId) {
    manager.handle_bridge_remove(id, false).unwrap();
    manager.forget_node(id).unwrap();
}

/// Detach and drop an endpoint.
pub fn remove_end_point(manager: &mut NetworkManager, id: NodeId) {
    manager.handle_end_point_remove(id, false).unwrap();
    manager.forget_node(id).unwrap();
}

pub fn energy_of(manager: &NetworkManager, id: NodeId) -> u64 {
    manager.energy_holder(id).map_or(0, |h| h.energy())
}

pub fn fluid_of(manager: &NetworkManager, id: NodeId) -> u64 {
    manager.fluid_holder(id).map_or(0, |h| h.amount())
}

pub fn items_of(manager: &NetworkManager, id: NodeId) -> u32 {
    manager.item_holder(id).and_then(|h| h.peek()).map_or(0, |s| s.count)
}

/// Energy stored across every endpoint.
pub fn total_energy(manager: &NetworkManager) -> u64 {
    manager
        .nodes()
        .filter_map(|(_, n)| n.as_end_point()?.energy_holder().map(|h| h.energy()))
        .sum()
}

// ===========================================================================
// Scenario builders
// ===========================================================================

/// A straight line of energy cables along +x starting at the origin.
pub fn build_cable_line(manager: &mut NetworkManager, length: i32, rate: u64) -> Vec<NodeId> {
    (0..length).map(|x| add_bridge(manager, pos(x, 0, 0), energy_cable(rate))).collect()
}

/// A `rows x cols` grid of energy cables on y=0. Every cable has a provider
/// above it and a consumer below it.
pub fn build_power_grid(rows: i32, cols: i32, rate: u64) -> (NetworkManager, Vec<NodeId>, Vec<NodeId>) {
    let mut manager = NetworkManager::default();
    let mut providers = Vec::new();
    let mut consumers = Vec::new();
    for x in 0..cols {
        for z in 0..rows {
            add_bridge(&mut manager, pos(x, 0, z), energy_cable(rate));
            providers.push(add_end_point(
                &mut manager,
                pos(x, 1, z),
                energy_cell(ConnectionType::Provide, 10_000, 10_000),
            ));
            consumers.push(add_end_point(
                &mut manager,
                pos(x, -1, z),
                energy_cell(ConnectionType::Consume, 10_000, 0),
            ));
        }
    }
    (manager, providers, consumers)
}
