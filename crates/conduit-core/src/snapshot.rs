//! Export and restore of endpoint holder state.
//!
//! The graph itself is never persisted: it is rebuilt from add notifications
//! when the world loads. What the embedder does need to keep are the stored
//! amounts, keyed by position. [`HolderSnapshot`] captures them into a
//! versioned `bitcode` blob.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::holder::ItemStack;
use crate::id::BlockPos;
use crate::manager::NetworkManager;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a holder snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0xC0D0_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Manager tick at capture time.
    pub tick: u64,
}

impl SnapshotHeader {
    pub fn new(tick: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// Stored amounts of one endpoint. Holders the endpoint lacks are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderState {
    pub pos: BlockPos,
    pub energy: Option<u64>,
    pub fluid: Option<u64>,
    pub item: Option<ItemStack>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderSnapshot {
    pub header: SnapshotHeader,
    pub holders: Vec<HolderState>,
}

impl HolderSnapshot {
    /// Capture every endpoint's holder state, ordered by position.
    pub fn capture(manager: &NetworkManager) -> Self {
        let mut holders: Vec<HolderState> = manager
            .nodes()
            .filter_map(|(_, node)| {
                let end_point = node.as_end_point()?;
                Some(HolderState {
                    pos: node.pos(),
                    energy: end_point.energy_holder().map(|h| h.energy()),
                    fluid: end_point.fluid_holder().map(|h| h.amount()),
                    item: end_point.item_holder().and_then(|h| h.peek()),
                })
            })
            .collect();
        holders.sort_by_key(|h| h.pos);

        Self {
            header: SnapshotHeader::new(manager.current_tick()),
            holders,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, SerializeError> {
        bitcode::serialize(self).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Decode and validate the header before handing the snapshot out.
    pub fn decode(data: &[u8]) -> Result<Self, DeserializeError> {
        let snapshot: HolderSnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        Ok(snapshot)
    }

    /// Write the captured amounts back onto the endpoints now at the same
    /// positions. Returns how many endpoints were restored; positions with no
    /// endpoint are skipped.
    pub fn restore(&self, manager: &mut NetworkManager) -> usize {
        let mut restored = 0;
        for state in &self.holders {
            let Some(id) = manager.node_at(state.pos) else {
                continue;
            };
            if manager.node(id).and_then(|n| n.as_end_point()).is_none() {
                continue;
            }
            if let (Some(energy), Some(holder)) = (state.energy, manager.energy_holder_mut(id)) {
                holder.set_energy(energy);
            }
            if let (Some(amount), Some(holder)) = (state.fluid, manager.fluid_holder_mut(id)) {
                holder.set_amount(amount);
            }
            if let Some(holder) = manager.item_holder_mut(id) {
                if let Some(current) = holder.peek() {
                    holder.take(current.item, current.count);
                }
                if let Some(stack) = state.item {
                    holder.insert(stack.item, stack.count);
                }
            }
            restored += 1;
        }
        debug!(restored, total = self.holders.len(), "holder snapshot restored");
        restored
    }
}
