use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::direction::Direction;

new_key_type! {
    /// Identifies a node (bridge or endpoint) registered with the manager.
    pub struct NodeId;

    /// Identifies a live network.
    pub struct NetworkId;
}

/// Identifies a world (dimension) a node lives in. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorldId(pub u32);

/// Identifies an item type. Opaque to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemTypeId(pub u32);

/// The stable spatial key of a node: a world plus integer block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub world: WorldId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(world: WorldId, x: i32, y: i32, z: i32) -> Self {
        Self { world, x, y, z }
    }

    /// Shorthand for a position in world 0.
    pub fn origin_world(x: i32, y: i32, z: i32) -> Self {
        Self::new(WorldId(0), x, y, z)
    }

    /// The position one block away in `direction`. Coordinates wrap at the
    /// edges of the `i32` range.
    pub fn offset(&self, direction: Direction) -> Self {
        let (dx, dy, dz) = direction.offset();
        Self {
            world: self.world,
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
            z: self.z.wrapping_add(dz),
        }
    }
}

/// The resource kinds a network can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Energy,
    Item,
    Fluid,
}

impl ResourceType {
    /// All resource types, in processing order.
    pub const ALL: [ResourceType; 3] = [ResourceType::Energy, ResourceType::Item, ResourceType::Fluid];
}
