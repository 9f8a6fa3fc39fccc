//! Property-based tests for settlement and topology maintenance.
//!
//! Uses proptest to generate random ledgers and random build/tear-down
//! sequences on a small block grid, then verifies conservation and graph
//! consistency.

use conduit_core::direction::Direction;
use conduit_core::holder::ConnectionType;
use conduit_core::id::NodeId;
use conduit_core::manager::NetworkManager;
use conduit_core::node::{Bridge, TransferRates};
use conduit_core::share::{Ledger, settle, split_equally, total};
use conduit_core::test_utils::*;
use conduit_core::validation::check_topology;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

fn arb_amounts(max_len: usize) -> impl Strategy<Value = Vec<u64>> {
    proptest::collection::vec(0..10_000u64, 0..=max_len)
}

fn arb_ledger() -> impl Strategy<Value = Ledger> {
    (arb_amounts(6), arb_amounts(6), arb_amounts(4)).prop_flat_map(|(providers, consumers, buffers)| {
        let len = buffers.len();
        proptest::collection::vec(0..10_000u64, len).prop_map(move |buffer_requests| Ledger {
            provider_stock: providers.clone(),
            consumer_requests: consumers.clone(),
            buffer_stock: buffers.clone(),
            buffer_requests,
        })
    })
}

/// Topology operations on a 4x2x4 grid.
#[derive(Debug, Clone)]
enum TopoOp {
    AddCable(i32, i32, i32),
    AddCell(i32, i32, i32, u8),
    Remove(usize),
    Wrench(usize, usize),
    Tick,
}

fn arb_topology_ops(max_ops: usize) -> impl Strategy<Value = Vec<TopoOp>> {
    proptest::collection::vec(
        prop_oneof![
            3 => (0..4i32, 0..2i32, 0..4i32).prop_map(|(x, y, z)| TopoOp::AddCable(x, y, z)),
            2 => (0..4i32, 0..2i32, 0..4i32, 0..3u8).prop_map(|(x, y, z, c)| TopoOp::AddCell(x, y, z, c)),
            2 => (0..64usize).prop_map(TopoOp::Remove),
            1 => (0..64usize, 0..6usize).prop_map(|(n, f)| TopoOp::Wrench(n, f)),
            1 => Just(TopoOp::Tick),
        ],
        1..=max_ops,
    )
}

fn cell_connection(kind: u8) -> ConnectionType {
    match kind {
        0 => ConnectionType::Provide,
        1 => ConnectionType::Consume,
        _ => ConnectionType::Buffer,
    }
}

fn all_resource_cable() -> Bridge {
    Bridge::new(TransferRates {
        energy: 250,
        item: 4,
        fluid: 100,
    })
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Equal split never grants past a limit and hands out exactly what it
    /// does not return.
    #[test]
    fn split_respects_limits(amount in 0..50_000u64, limits in arb_amounts(8)) {
        let mut grants = vec![0; limits.len()];
        let left = split_equally(amount, &limits, &mut grants);

        for (grant, limit) in grants.iter().zip(&limits) {
            prop_assert!(grant <= limit);
        }
        prop_assert_eq!(total(&grants) + left, amount);
        if left > 0 {
            prop_assert_eq!(grants, limits);
        }
    }

    /// Settlement conserves the resource and stays within every stock,
    /// request and the transfer rate.
    #[test]
    fn settlement_conserves(ledger in arb_ledger(), rate in 0..20_000u64) {
        let settlement = settle(&ledger, rate);
        prop_assert!(settlement.is_ok(), "consistent ledger faulted: {:?}", settlement);
        let s = settlement.unwrap();

        let gained = total(&s.consumer_gain) + total(&s.buffer_gain);
        let lost = total(&s.provider_loss) + total(&s.buffer_loss);
        prop_assert_eq!(gained, lost);
        prop_assert_eq!(gained, s.moved);
        prop_assert!(s.moved <= rate);

        for (loss, stock) in s.provider_loss.iter().zip(&ledger.provider_stock) {
            prop_assert!(loss <= stock);
        }
        for (gain, request) in s.consumer_gain.iter().zip(&ledger.consumer_requests) {
            prop_assert!(gain <= request);
        }
        for (loss, stock) in s.buffer_loss.iter().zip(&ledger.buffer_stock) {
            prop_assert!(loss <= stock);
        }
        for (gain, request) in s.buffer_gain.iter().zip(&ledger.buffer_requests) {
            prop_assert!(gain <= request);
        }
        if s.used_buffers {
            prop_assert_eq!(total(&s.buffer_gain), 0);
        } else {
            prop_assert_eq!(total(&s.buffer_loss), 0);
        }
    }

    /// Any sequence of additions, removals and wrench toggles leaves a
    /// symmetric graph whose networks match their members, and ticking it
    /// neither faults nor creates or destroys energy.
    #[test]
    fn topology_stays_consistent(ops in arb_topology_ops(60)) {
        let mut manager = NetworkManager::default();
        let mut live: Vec<NodeId> = Vec::new();

        for op in ops {
            match op.clone() {
                TopoOp::AddCable(x, y, z) => {
                    if manager.node_at(pos(x, y, z)).is_none() {
                        live.push(add_bridge(&mut manager, pos(x, y, z), all_resource_cable()));
                    }
                }
                TopoOp::AddCell(x, y, z, kind) => {
                    if manager.node_at(pos(x, y, z)).is_none() {
                        let cell = energy_cell(cell_connection(kind), 1_000, 500);
                        live.push(add_end_point(&mut manager, pos(x, y, z), cell));
                    }
                }
                TopoOp::Remove(idx) => {
                    if !live.is_empty() {
                        let id = live.remove(idx % live.len());
                        if manager.node(id).is_some_and(|n| n.is_bridge()) {
                            remove_bridge(&mut manager, id);
                        } else {
                            remove_end_point(&mut manager, id);
                        }
                    }
                }
                TopoOp::Wrench(idx, face) => {
                    if !live.is_empty() {
                        let id = live[idx % live.len()];
                        if manager.node(id).is_some_and(|n| n.is_bridge()) {
                            manager.reconfigure_bridge_face(id, Direction::ALL[face]).unwrap();
                        }
                    }
                }
                TopoOp::Tick => {
                    let before = total_energy(&manager);
                    prop_assert!(manager.tick().is_ok());
                    prop_assert_eq!(total_energy(&manager), before);
                }
            }

            let problems = check_topology(&manager);
            prop_assert!(problems.is_empty(), "inconsistent after {:?}: {:?}", op, problems);
        }

        for (id, network) in manager.networks() {
            prop_assert!(!network.members().is_empty(), "empty network {:?} left behind", id);
        }
    }
}
