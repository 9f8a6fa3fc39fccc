//! Resource holder capabilities owned by endpoints.
//!
//! Holders are implemented by the embedding system (machines, batteries,
//! chests, tanks) and handed to the manager as boxed trait objects. The core
//! only reads and writes them from inside a network tick, which always runs
//! under the coordinator's exclusive section.
//!
//! [`EnergyCell`], [`FluidTank`] and [`ItemBuffer`] are ready-made holders
//! for simple storage blocks.

use serde::{Deserialize, Serialize};

use crate::direction::{Direction, DirectionSet};
use crate::id::ItemTypeId;

/// The role a holder plays on one of its faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionType {
    /// The face does not take part in networks.
    #[default]
    None,
    /// The holder hands out its stock through this face.
    Provide,
    /// The holder accepts resources through this face.
    Consume,
    /// The holder both stores and hands out resources through this face.
    Buffer,
}

/// A per-face connection configuration, indexed by [`Direction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SideConfig([ConnectionType; 6]);

impl SideConfig {
    /// Every face uses `connection`.
    pub fn uniform(connection: ConnectionType) -> Self {
        Self([connection; 6])
    }

    /// Only the given faces use `connection`; the rest are [`ConnectionType::None`].
    pub fn exclusive(connection: ConnectionType, faces: &[Direction]) -> Self {
        let mut config = Self::default();
        for face in faces {
            config.set(*face, connection);
        }
        config
    }

    pub fn get(&self, direction: Direction) -> ConnectionType {
        self.0[direction as usize]
    }

    pub fn set(&mut self, direction: Direction, connection: ConnectionType) {
        self.0[direction as usize] = connection;
    }

    /// Faces whose connection is anything but [`ConnectionType::None`].
    pub fn active_faces(&self) -> DirectionSet {
        Direction::ALL
            .into_iter()
            .filter(|d| self.get(*d) != ConnectionType::None)
            .collect()
    }
}

/// Energy storage and demand of an endpoint.
pub trait EnergyHolder: Send {
    /// Energy currently stored.
    fn energy(&self) -> u64;
    /// Overwrite the stored energy. Called by the energy network only.
    fn set_energy(&mut self, energy: u64);
    /// How much energy the holder wants to receive this tick.
    fn requested_energy(&self) -> u64;
    /// Role of the holder at `direction`.
    fn connection(&self, direction: Direction) -> ConnectionType;
    /// Change the role at `direction`. Only call through
    /// [`crate::manager::NetworkManager::reconfigure_end_point_face`] once the
    /// endpoint is registered.
    fn set_connection(&mut self, direction: Direction, connection: ConnectionType);
}

/// Fluid storage and demand of an endpoint.
pub trait FluidHolder: Send {
    fn amount(&self) -> u64;
    fn set_amount(&mut self, amount: u64);
    fn requested_amount(&self) -> u64;
    fn connection(&self, direction: Direction) -> ConnectionType;
    fn set_connection(&mut self, direction: Direction, connection: ConnectionType);
}

/// A quantity of a single item type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: ItemTypeId,
    pub count: u32,
}

impl ItemStack {
    pub fn new(item: ItemTypeId, count: u32) -> Self {
        Self { item, count }
    }
}

/// Item inventory access of an endpoint.
pub trait ItemHolder: Send {
    fn connection(&self, direction: Direction) -> ConnectionType;
    fn set_connection(&mut self, direction: Direction, connection: ConnectionType);
    /// The stack the holder would hand out next, if any.
    fn peek(&self) -> Option<ItemStack>;
    /// How many of `stack` the holder could accept right now.
    fn accepts(&self, stack: ItemStack) -> u32;
    /// Remove `count` of `item`. Never called with more than [`peek`](Self::peek) reported.
    fn take(&mut self, item: ItemTypeId, count: u32);
    /// Add `count` of `item`. Never called with more than [`accepts`](Self::accepts) reported.
    fn insert(&mut self, item: ItemTypeId, count: u32);
}

// ---------------------------------------------------------------------------
// Ready-made holders
// ---------------------------------------------------------------------------

/// A capacity-bounded energy store. Requests whatever headroom it has left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyCell {
    pub capacity: u64,
    pub energy: u64,
    pub sides: SideConfig,
}

impl EnergyCell {
    pub fn new(capacity: u64, energy: u64, sides: SideConfig) -> Self {
        Self {
            capacity,
            energy: energy.min(capacity),
            sides,
        }
    }

    /// A cell that buffers on every face.
    pub fn buffer(capacity: u64, energy: u64) -> Self {
        Self::new(capacity, energy, SideConfig::uniform(ConnectionType::Buffer))
    }
}

impl EnergyHolder for EnergyCell {
    fn energy(&self) -> u64 {
        self.energy
    }

    fn set_energy(&mut self, energy: u64) {
        self.energy = energy;
    }

    fn requested_energy(&self) -> u64 {
        self.capacity.saturating_sub(self.energy)
    }

    fn connection(&self, direction: Direction) -> ConnectionType {
        self.sides.get(direction)
    }

    fn set_connection(&mut self, direction: Direction, connection: ConnectionType) {
        self.sides.set(direction, connection);
    }
}

/// A capacity-bounded fluid store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FluidTank {
    pub capacity: u64,
    pub amount: u64,
    pub sides: SideConfig,
}

impl FluidTank {
    pub fn new(capacity: u64, amount: u64, sides: SideConfig) -> Self {
        Self {
            capacity,
            amount: amount.min(capacity),
            sides,
        }
    }
}

impl FluidHolder for FluidTank {
    fn amount(&self) -> u64 {
        self.amount
    }

    fn set_amount(&mut self, amount: u64) {
        self.amount = amount;
    }

    fn requested_amount(&self) -> u64 {
        self.capacity.saturating_sub(self.amount)
    }

    fn connection(&self, direction: Direction) -> ConnectionType {
        self.sides.get(direction)
    }

    fn set_connection(&mut self, direction: Direction, connection: ConnectionType) {
        self.sides.set(direction, connection);
    }
}

/// A single-stack item inventory with a size limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBuffer {
    pub stack: Option<ItemStack>,
    pub limit: u32,
    pub sides: SideConfig,
}

impl ItemBuffer {
    pub fn new(limit: u32, sides: SideConfig) -> Self {
        Self {
            stack: None,
            limit,
            sides,
        }
    }

    pub fn with_stack(mut self, stack: ItemStack) -> Self {
        self.stack = Some(ItemStack::new(stack.item, stack.count.min(self.limit)));
        self
    }

    /// Number of `item` currently held.
    pub fn count_of(&self, item: ItemTypeId) -> u32 {
        match self.stack {
            Some(s) if s.item == item => s.count,
            _ => 0,
        }
    }
}

impl ItemHolder for ItemBuffer {
    fn connection(&self, direction: Direction) -> ConnectionType {
        self.sides.get(direction)
    }

    fn set_connection(&mut self, direction: Direction, connection: ConnectionType) {
        self.sides.set(direction, connection);
    }

    fn peek(&self) -> Option<ItemStack> {
        self.stack.filter(|s| s.count > 0)
    }

    fn accepts(&self, stack: ItemStack) -> u32 {
        match self.stack {
            None => stack.count.min(self.limit),
            Some(s) if s.item == stack.item => stack.count.min(self.limit.saturating_sub(s.count)),
            Some(_) => 0,
        }
    }

    fn take(&mut self, item: ItemTypeId, count: u32) {
        if let Some(s) = self.stack.as_mut() {
            if s.item == item {
                s.count = s.count.saturating_sub(count);
                if s.count == 0 {
                    self.stack = None;
                }
            }
        }
    }

    fn insert(&mut self, item: ItemTypeId, count: u32) {
        if count == 0 {
            return;
        }
        match self.stack.as_mut() {
            Some(s) if s.item == item => s.count += count,
            Some(_) => {}
            None => self.stack = Some(ItemStack::new(item, count)),
        }
    }
}
