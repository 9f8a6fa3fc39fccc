use slotmap::SlotMap;
use tracing::{error, trace};

use super::{Members, StockAccess, settle_members, transfer_rate};
use crate::error::NetworkFault;
use crate::id::{NetworkId, NodeId, ResourceType};
use crate::node::Node;

/// Balances fluid between tanks and machines every tick with the same
/// equal-share settlement energy uses, bounded by the bridges' fluid ceiling.
#[derive(Debug, Clone, Default)]
pub struct FluidNetwork {
    pub(crate) members: Members,
}

struct FluidStock;

impl StockAccess for FluidStock {
    fn read(node: &Node) -> Option<(u64, u64)> {
        node.as_end_point()
            .and_then(|e| e.fluid_holder())
            .map(|h| (h.amount(), h.requested_amount()))
    }

    fn write(node: &mut Node, stored: u64) {
        if let Some(holder) = node.as_end_point_mut().and_then(|e| e.fluid_holder_mut()) {
            holder.set_amount(stored);
        }
    }
}

impl FluidNetwork {
    pub fn members(&self) -> &Members {
        &self.members
    }

    pub(crate) fn handle_tick(
        &mut self,
        id: NetworkId,
        nodes: &mut SlotMap<NodeId, Node>,
    ) -> Result<(), NetworkFault> {
        let rate = transfer_rate(&self.members, nodes, ResourceType::Fluid);
        let settlement =
            settle_members::<FluidStock>(&self.members, nodes, rate).map_err(|r| Self::residual_fault(id, r))?;
        trace!(network = ?id, moved = settlement.moved, "fluid settled");
        Ok(())
    }

    /// The fault for fluid handed out that no source could cover.
    pub(crate) fn residual_fault(id: NetworkId, residual: u64) -> NetworkFault {
        error!(network = ?id, residual, "fluid conservation violated");
        NetworkFault::FluidDeficit { network: id, residual }
    }
}
