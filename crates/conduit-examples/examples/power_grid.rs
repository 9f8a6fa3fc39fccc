//! Power grid example: cables, a generator, machines and a battery.
//!
//! Lays out a small factory through the coordinator, runs it for a few
//! seconds of game time, cuts a cable with a wrench and shows how the
//! network splits and the battery takes over.
//!
//! Run with: `RUST_LOG=conduit_core=debug cargo run -p conduit-examples --example power_grid`

use conduit_core::config::CableTier;
use conduit_core::coordinator::{Coordinator, TickOutcome};
use conduit_core::debug::{DebugFeed, ViewerId};
use conduit_core::direction::{Direction, DirectionSet};
use conduit_core::holder::{ConnectionType, EnergyCell, SideConfig};
use conduit_core::id::{BlockPos, ResourceType};
use conduit_core::manager::NetworkManager;
use conduit_core::node::EndPoint;
use conduit_data::ConduitConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn at(x: i32, y: i32) -> BlockPos {
    BlockPos::origin_world(x, y, 0)
}

fn cell(connection: ConnectionType, capacity: u64, energy: u64) -> EndPoint {
    EndPoint::new().with_energy(EnergyCell::new(capacity, energy, SideConfig::uniform(connection)))
}

fn place_cable(m: &mut NetworkManager, x: i32, tier: &CableTier) {
    let bridge = tier.bridge_with(&[ResourceType::Energy], DirectionSet::ALL);
    let placed = m.insert_bridge(at(x, 0), bridge).and_then(|id| m.handle_bridge_add(id));
    if let Err(fault) = placed {
        tracing::warn!(%fault, x, "cable not placed");
    }
}

fn place_machine(m: &mut NetworkManager, x: i32, y: i32, end_point: EndPoint) {
    let placed = m
        .insert_end_point(at(x, y), end_point)
        .and_then(|id| m.handle_end_point_add(id, true));
    if let Err(fault) = placed {
        tracing::warn!(%fault, x, y, "machine not placed");
    }
}

fn report(coordinator: &Coordinator, label: &str) {
    coordinator.run_now(|m| {
        let stored: Vec<(BlockPos, u64)> = m
            .nodes()
            .filter_map(|(id, node)| Some((node.pos(), m.energy_holder(id)?.energy())))
            .collect();
        tracing::info!(label, networks = m.network_count(), ?stored, "grid state");
    });
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "power_grid=info,conduit_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConduitConfig::default();
    let tier = match config.tier("advanced") {
        Ok(tier) => tier.clone(),
        Err(e) => {
            tracing::error!(%e, "missing cable tier");
            return;
        }
    };
    let coordinator = Coordinator::new(config.manager());

    // --- Build: a line of eight cables with machines on top ---

    coordinator.run_sync(move |m| {
        for x in 0..8 {
            place_cable(m, x, &tier);
        }
        place_machine(m, 0, 1, cell(ConnectionType::Provide, 2_000, 2_000)); // generator
        place_machine(m, 3, 1, cell(ConnectionType::Buffer, 5_000, 0)); // battery
        place_machine(m, 5, 1, cell(ConnectionType::Consume, 800, 0)); // assembler
        place_machine(m, 7, 1, cell(ConnectionType::Consume, 300, 0)); // lamp
    });

    for _ in 0..3 {
        if let TickOutcome::Faulted(fault) = coordinator.tick() {
            tracing::error!(%fault, "grid faulted");
            return;
        }
    }
    report(&coordinator, "after start-up");

    // --- Cut: disable the east face of cable 2 with a wrench ---

    coordinator.run_sync(|m| {
        if let Some(id) = m.node_at(at(2, 0)) {
            if let Err(fault) = m.reconfigure_bridge_face(id, Direction::East) {
                tracing::warn!(%fault, "wrench failed");
            }
        }
        for event in m.drain_events() {
            tracing::info!(?event, "topology event");
        }
    });

    // Drain the consumers so the battery has to cover them.
    coordinator.run_sync(|m| {
        for x in [5, 7] {
            if let Some(id) = m.node_at(at(x, 1)) {
                if let Some(holder) = m.energy_holder_mut(id) {
                    holder.set_energy(0);
                }
            }
        }
    });

    for _ in 0..3 {
        coordinator.tick();
    }
    report(&coordinator, "after the cut");

    // --- Inspect: what a player with the debug view would see ---

    let mut feed = DebugFeed::new();
    feed.toggle_viewer(ViewerId(1), ResourceType::Energy);
    if let Some(traces) = coordinator.poll_debug(&feed) {
        for trace in traces {
            tracing::info!(
                network = ?trace.network,
                color = %format!("#{:06x}", trace.color),
                points = trace.points.len(),
                "network trace"
            );
        }
    }
}
