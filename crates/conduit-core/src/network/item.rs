use std::collections::BTreeSet;

use slotmap::SlotMap;
use tracing::trace;

use super::{Members, transfer_rate};
use crate::holder::ItemStack;
use crate::id::{NetworkId, NodeId, ResourceType};
use crate::node::Node;

/// Cycles a starting index through `0..len` so no source is always first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundRobinCounter {
    next: usize,
}

impl RoundRobinCounter {
    /// Index to start from for a list of `len` entries.
    pub fn get(&self, len: usize) -> usize {
        if len == 0 { 0 } else { self.next % len }
    }

    pub fn increment(&mut self, len: usize) {
        if len == 0 {
            self.next = 0;
        } else {
            self.next = (self.next + 1) % len;
        }
    }
}

/// Moves item stacks from providers and buffers to consumers and buffers.
///
/// Ticked at a reduced cadence by the manager. Each tick moves at most the
/// slowest bridge's item rate in total; the source visited first rotates.
/// A buffer that received items this tick does not give any back until the
/// next one.
#[derive(Debug, Clone, Default)]
pub struct ItemNetwork {
    pub(crate) members: Members,
    round_robin: RoundRobinCounter,
}

impl ItemNetwork {
    pub fn members(&self) -> &Members {
        &self.members
    }

    pub(crate) fn handle_tick(&mut self, id: NetworkId, nodes: &mut SlotMap<NodeId, Node>) {
        let mut budget = transfer_rate(&self.members, nodes, ResourceType::Item);

        let sources: Vec<NodeId> = self
            .members
            .providers()
            .iter()
            .chain(self.members.buffers())
            .copied()
            .collect();
        let sinks: Vec<NodeId> = self
            .members
            .consumers()
            .iter()
            .chain(self.members.buffers())
            .copied()
            .collect();

        let start = self.round_robin.get(sources.len());
        let mut moved = 0u64;
        // A buffer either gives or receives within one tick, never both.
        let mut gave: BTreeSet<NodeId> = BTreeSet::new();
        let mut received: BTreeSet<NodeId> = BTreeSet::new();

        for offset in 0..sources.len() {
            if budget == 0 {
                break;
            }
            let source = sources[(start + offset) % sources.len()];
            if received.contains(&source) {
                continue;
            }
            let Some(stack) = peek(nodes, source) else {
                continue;
            };

            let targets: Vec<NodeId> = sinks
                .iter()
                .copied()
                .filter(|s| *s != source && !gave.contains(s))
                .collect();
            let mut remaining = u64::from(stack.count).min(budget);
            for sink in targets {
                if remaining == 0 {
                    break;
                }
                // remaining <= stack.count, so it fits in u32
                let offer = ItemStack::new(stack.item, remaining as u32);
                let count = accepts(nodes, sink, offer).min(offer.count);
                if count == 0 {
                    continue;
                }
                if let Some(holder) = nodes[source].as_end_point_mut().and_then(|e| e.item_holder_mut()) {
                    holder.take(stack.item, count);
                }
                if let Some(holder) = nodes[sink].as_end_point_mut().and_then(|e| e.item_holder_mut()) {
                    holder.insert(stack.item, count);
                }
                remaining -= u64::from(count);
                budget -= u64::from(count);
                moved += u64::from(count);
                gave.insert(source);
                received.insert(sink);
            }
        }

        self.round_robin.increment(sources.len());
        trace!(network = ?id, moved, "items moved");
    }
}

fn peek(nodes: &SlotMap<NodeId, Node>, id: NodeId) -> Option<ItemStack> {
    nodes
        .get(id)
        .and_then(Node::as_end_point)
        .and_then(|e| e.item_holder())
        .and_then(|h| h.peek())
}

fn accepts(nodes: &SlotMap<NodeId, Node>, id: NodeId, stack: ItemStack) -> u32 {
    nodes
        .get(id)
        .and_then(Node::as_end_point)
        .and_then(|e| e.item_holder())
        .map_or(0, |h| h.accepts(stack))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::Direction;
    use crate::holder::{ConnectionType, ItemBuffer, SideConfig};
    use crate::id::{BlockPos, ItemTypeId};
    use crate::network::Network;
    use crate::node::{Bridge, EndPoint, NodeKind, TransferRates};

    const IRON: ItemTypeId = ItemTypeId(1);

    fn chest(nodes: &mut SlotMap<NodeId, Node>, connection: ConnectionType, count: u32) -> NodeId {
        let x = nodes.len() as i32;
        let mut buffer = ItemBuffer::new(64, SideConfig::uniform(connection));
        if count > 0 {
            buffer = buffer.with_stack(ItemStack::new(IRON, count));
        }
        nodes.insert(Node::new(
            BlockPos::origin_world(x, 0, 0),
            NodeKind::EndPoint(EndPoint::new().with_item(buffer)),
        ))
    }

    fn count(nodes: &SlotMap<NodeId, Node>, id: NodeId) -> u32 {
        nodes[id]
            .as_end_point()
            .and_then(|e| e.item_holder())
            .and_then(|h| h.peek())
            .map_or(0, |s| s.count)
    }

    fn network_id() -> NetworkId {
        SlotMap::<NetworkId, ()>::with_key().insert(())
    }

    #[test]
    fn round_robin_wraps() {
        let mut rr = RoundRobinCounter::default();
        assert_eq!(rr.get(3), 0);
        rr.increment(3);
        rr.increment(3);
        assert_eq!(rr.get(3), 2);
        rr.increment(3);
        assert_eq!(rr.get(3), 0);
        assert_eq!(rr.get(0), 0);
    }

    #[test]
    fn moves_up_to_bridge_rate() {
        let mut nodes = SlotMap::with_key();
        let cable = nodes.insert(Node::new(
            BlockPos::origin_world(50, 0, 0),
            NodeKind::Bridge(Bridge::new(TransferRates { energy: 0, item: 8, fluid: 0 })),
        ));
        let source = chest(&mut nodes, ConnectionType::Provide, 20);
        let sink = chest(&mut nodes, ConnectionType::Consume, 0);

        let mut net = Network::new(ResourceType::Item);
        net.add_bridge(cable);
        net.add_end_point(source, Direction::Up, ConnectionType::Provide).unwrap();
        net.add_end_point(sink, Direction::Up, ConnectionType::Consume).unwrap();

        net.handle_tick(network_id(), &mut nodes).unwrap();
        assert_eq!(count(&nodes, source), 12);
        assert_eq!(count(&nodes, sink), 8);
    }

    #[test]
    fn rotates_the_first_source() {
        let mut nodes = SlotMap::with_key();
        let cable = nodes.insert(Node::new(
            BlockPos::origin_world(50, 0, 0),
            NodeKind::Bridge(Bridge::new(TransferRates { energy: 0, item: 4, fluid: 0 })),
        ));
        let a = chest(&mut nodes, ConnectionType::Provide, 10);
        let b = chest(&mut nodes, ConnectionType::Provide, 10);
        let sink = chest(&mut nodes, ConnectionType::Consume, 0);

        let mut net = Network::new(ResourceType::Item);
        net.add_bridge(cable);
        net.add_end_point(a, Direction::Up, ConnectionType::Provide).unwrap();
        net.add_end_point(b, Direction::Up, ConnectionType::Provide).unwrap();
        net.add_end_point(sink, Direction::Up, ConnectionType::Consume).unwrap();

        net.handle_tick(network_id(), &mut nodes).unwrap();
        assert_eq!((count(&nodes, a), count(&nodes, b)), (6, 10));
        net.handle_tick(network_id(), &mut nodes).unwrap();
        assert_eq!((count(&nodes, a), count(&nodes, b)), (6, 6));
        assert_eq!(count(&nodes, sink), 8);
    }

    #[test]
    fn buffers_do_not_hand_items_back_in_one_tick() {
        let mut nodes = SlotMap::with_key();
        let cable = nodes.insert(Node::new(
            BlockPos::origin_world(50, 0, 0),
            NodeKind::Bridge(Bridge::new(TransferRates { energy: 0, item: 20, fluid: 0 })),
        ));
        let full = chest(&mut nodes, ConnectionType::Buffer, 10);
        let empty = chest(&mut nodes, ConnectionType::Buffer, 0);

        let mut net = Network::new(ResourceType::Item);
        net.add_bridge(cable);
        net.add_end_point(full, Direction::Up, ConnectionType::Buffer).unwrap();
        net.add_end_point(empty, Direction::Up, ConnectionType::Buffer).unwrap();

        net.handle_tick(network_id(), &mut nodes).unwrap();
        assert_eq!(count(&nodes, full), 0);
        assert_eq!(count(&nodes, empty), 10);
    }

    #[test]
    fn full_sink_stops_transfer() {
        let mut nodes = SlotMap::with_key();
        let source = chest(&mut nodes, ConnectionType::Provide, 10);
        let sink = chest(&mut nodes, ConnectionType::Consume, 64);

        let mut net = Network::new(ResourceType::Item);
        net.add_end_point(source, Direction::Up, ConnectionType::Provide).unwrap();
        net.add_end_point(sink, Direction::Up, ConnectionType::Consume).unwrap();

        net.handle_tick(network_id(), &mut nodes).unwrap();
        assert_eq!(count(&nodes, source), 10);
        assert_eq!(count(&nodes, sink), 64);
    }
}
