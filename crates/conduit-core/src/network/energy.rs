use slotmap::SlotMap;
use tracing::{error, trace};

use super::{Members, StockAccess, settle_members, transfer_rate};
use crate::error::NetworkFault;
use crate::id::{NetworkId, NodeId, ResourceType};
use crate::node::Node;

/// Moves energy from providers (and buffers, when providers fall short) to
/// consumers (and buffers, when there is surplus) once per tick.
///
/// Per tick:
/// 1. Cap provider supply, consumer demand and buffer supply at the
///    network's transfer rate (the slowest bridge).
/// 2. Draw on buffers only if demand exceeds provider supply.
/// 3. Hand the available energy out in equal shares; leftover fills buffers
///    if they were not a source.
/// 4. Take what was handed out from providers in equal shares, then from
///    buffers. Any residual is a conservation fault.
///
/// Supply nobody asked for stays in the providers.
#[derive(Debug, Clone, Default)]
pub struct EnergyNetwork {
    pub(crate) members: Members,
}

struct EnergyStock;

impl StockAccess for EnergyStock {
    fn read(node: &Node) -> Option<(u64, u64)> {
        node.as_end_point()
            .and_then(|e| e.energy_holder())
            .map(|h| (h.energy(), h.requested_energy()))
    }

    fn write(node: &mut Node, stored: u64) {
        if let Some(holder) = node.as_end_point_mut().and_then(|e| e.energy_holder_mut()) {
            holder.set_energy(stored);
        }
    }
}

impl EnergyNetwork {
    pub fn members(&self) -> &Members {
        &self.members
    }

    pub(crate) fn handle_tick(
        &mut self,
        id: NetworkId,
        nodes: &mut SlotMap<NodeId, Node>,
    ) -> Result<(), NetworkFault> {
        let rate = transfer_rate(&self.members, nodes, ResourceType::Energy);
        let settlement =
            settle_members::<EnergyStock>(&self.members, nodes, rate).map_err(|r| Self::residual_fault(id, r))?;
        trace!(
            network = ?id,
            moved = settlement.moved,
            used_buffers = settlement.used_buffers,
            "energy settled"
        );
        Ok(())
    }

    /// The fault for energy handed out that no source could cover.
    pub(crate) fn residual_fault(id: NetworkId, residual: u64) -> NetworkFault {
        error!(network = ?id, residual, "energy conservation violated");
        NetworkFault::EnergyDeficit { network: id, residual }
    }
}
