//! Faults raised by the network core.
//!
//! There are no retryable errors: topology changes on well-formed input
//! always succeed. A fault is either a caller bug (contract violation) or a
//! broken invariant (consistency fault).

use crate::direction::Direction;
use crate::id::{BlockPos, NetworkId, NodeId, ResourceType};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkFault {
    // -- Contract violations --
    #[error("node not registered: {0:?}")]
    UnknownNode(NodeId),
    #[error("node {0:?} is not a bridge")]
    NotABridge(NodeId),
    #[error("node {0:?} is not an endpoint")]
    NotAnEndPoint(NodeId),
    #[error("position {0:?} already holds a node")]
    PositionOccupied(BlockPos),
    #[error("node {0:?} is still attached to the graph")]
    StillAttached(NodeId),
    #[error("endpoint {node:?} has no {resource:?} holder")]
    NoHolder { node: NodeId, resource: ResourceType },

    // -- Consistency faults --
    #[error("illegal {resource:?} connection type on {node:?} at {direction:?}")]
    IllegalConnection {
        node: NodeId,
        resource: ResourceType,
        direction: Direction,
    },
    #[error("not enough energy in {network:?}: residual deficit {residual}")]
    EnergyDeficit { network: NetworkId, residual: u64 },
    #[error("not enough fluid in {network:?}: residual deficit {residual}")]
    FluidDeficit { network: NetworkId, residual: u64 },
}

impl NetworkFault {
    /// The caller invoked an entry point with the wrong kind of node.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            NetworkFault::UnknownNode(_)
                | NetworkFault::NotABridge(_)
                | NetworkFault::NotAnEndPoint(_)
                | NetworkFault::PositionOccupied(_)
                | NetworkFault::StillAttached(_)
                | NetworkFault::NoHolder { .. }
        )
    }

    /// A graph or holder invariant was broken somewhere.
    pub fn is_consistency_fault(&self) -> bool {
        !self.is_contract_violation()
    }
}
