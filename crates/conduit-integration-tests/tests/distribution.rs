//! Integration test: resource distribution through managed networks.
//!
//! Each scenario lays out real cables and holders, runs manager ticks and
//! checks the amounts that arrive, including the equal-share and
//! satisfied-first rules, buffer behaviour, cable ceilings and item pacing.

use conduit_core::config::ManagerSettings;
use conduit_core::holder::{ConnectionType, ItemStack};
use conduit_core::id::{NodeId, ResourceType};
use conduit_core::manager::NetworkManager;
use conduit_core::test_utils::*;

/// A line of `len` energy cables at y=0 with a provider holding `stock` above
/// its first cable.
fn powered_line(len: i32, rate: u64, stock: u64) -> (NetworkManager, NodeId) {
    let mut m = NetworkManager::default();
    build_cable_line(&mut m, len, rate);
    let provider = add_end_point(&mut m, pos(0, 1, 0), energy_cell(ConnectionType::Provide, stock, stock));
    (m, provider)
}

#[test]
fn equal_share_between_two_consumers() {
    let (mut m, provider) = powered_line(6, 1_000, 40);
    let a = add_end_point(&mut m, pos(2, 1, 0), energy_cell(ConnectionType::Consume, 30, 0));
    let b = add_end_point(&mut m, pos(4, 1, 0), energy_cell(ConnectionType::Consume, 30, 0));

    m.tick().unwrap();
    assert_eq!(energy_of(&m, a), 20);
    assert_eq!(energy_of(&m, b), 20);
    assert_eq!(energy_of(&m, provider), 0);
}

#[test]
fn small_requests_are_satisfied_first() {
    let (mut m, provider) = powered_line(8, 1_000, 15);
    let consumers: Vec<_> = [(2, 10), (4, 10), (6, 5)]
        .into_iter()
        .map(|(x, capacity)| add_end_point(&mut m, pos(x, 1, 0), energy_cell(ConnectionType::Consume, capacity, 0)))
        .collect();

    m.tick().unwrap();
    let received: Vec<u64> = consumers.iter().map(|c| energy_of(&m, *c)).collect();
    assert_eq!(received, vec![5, 5, 5]);
    assert_eq!(energy_of(&m, provider), 0);
}

#[test]
fn slowest_cable_caps_the_network() {
    let mut m = NetworkManager::default();
    add_bridge(&mut m, pos(0, 0, 0), energy_cable(1_000));
    add_bridge(&mut m, pos(1, 0, 0), energy_cable(25));
    add_bridge(&mut m, pos(2, 0, 0), energy_cable(1_000));
    let provider = add_end_point(&mut m, pos(0, 1, 0), energy_cell(ConnectionType::Provide, 500, 500));
    let consumer = add_end_point(&mut m, pos(2, 1, 0), energy_cell(ConnectionType::Consume, 500, 0));

    m.tick().unwrap();
    assert_eq!(energy_of(&m, consumer), 25);
    m.tick().unwrap();
    assert_eq!(energy_of(&m, consumer), 50);
    assert_eq!(energy_of(&m, provider), 450);
}

#[test]
fn surplus_charges_buffers_and_deficit_drains_them() {
    let (mut m, provider) = powered_line(6, 1_000, 100);
    let battery = add_end_point(&mut m, pos(2, 1, 0), energy_cell(ConnectionType::Buffer, 1_000, 0));
    let machine = add_end_point(&mut m, pos(4, 1, 0), energy_cell(ConnectionType::Consume, 30, 0));

    // 100 supplied, 30 wanted: the remaining 70 goes into the battery.
    m.tick().unwrap();
    assert_eq!(energy_of(&m, machine), 30);
    assert_eq!(energy_of(&m, battery), 70);
    assert_eq!(energy_of(&m, provider), 0);

    // The provider is empty; the machine is refilled from the battery.
    m.energy_holder_mut(machine).unwrap().set_energy(0);
    m.tick().unwrap();
    assert_eq!(energy_of(&m, machine), 30);
    assert_eq!(energy_of(&m, battery), 40);
}

#[test]
fn energy_is_conserved_across_a_grid() {
    let (mut m, providers, consumers) = build_power_grid(4, 4, 300);
    let before = total_energy(&m);
    for _ in 0..40 {
        m.tick().unwrap();
        assert_eq!(total_energy(&m), before);
    }
    let delivered: u64 = consumers.iter().map(|c| energy_of(&m, *c)).sum();
    let remaining: u64 = providers.iter().map(|p| energy_of(&m, *p)).sum();
    assert_eq!(delivered + remaining, before);
    assert!(delivered > 0);
}

#[test]
fn fluid_flows_from_pump_to_tank() {
    let mut m = NetworkManager::default();
    for x in 0..3 {
        add_bridge(&mut m, pos(x, 0, 0), cable(ResourceType::Fluid, 50));
    }
    let pump = add_end_point(&mut m, pos(0, 1, 0), fluid_tank(ConnectionType::Provide, 1_000, 120));
    let tank = add_end_point(&mut m, pos(2, 1, 0), fluid_tank(ConnectionType::Consume, 1_000, 0));

    for _ in 0..3 {
        m.tick().unwrap();
    }
    assert_eq!(fluid_of(&m, tank), 120);
    assert_eq!(fluid_of(&m, pump), 0);
}

#[test]
fn items_move_only_on_item_ticks() {
    let settings = ManagerSettings {
        item_tick_interval: 4,
        ..ManagerSettings::default()
    };
    let mut m = NetworkManager::new(settings);
    for x in 0..3 {
        add_bridge(&mut m, pos(x, 0, 0), cable(ResourceType::Item, 2));
    }
    let source = add_end_point(
        &mut m,
        pos(0, 1, 0),
        chest(ConnectionType::Provide, 64, Some(ItemStack::new(iron(), 10))),
    );
    let sink = add_end_point(&mut m, pos(2, 1, 0), chest(ConnectionType::Consume, 64, None));

    // Steps 0 and 4 are item steps in the first eight.
    for _ in 0..8 {
        m.tick().unwrap();
    }
    assert_eq!(items_of(&m, sink), 4);
    assert_eq!(items_of(&m, source), 6);
}

#[test]
fn mixed_items_do_not_stack() {
    let settings = ManagerSettings {
        item_tick_interval: 1,
        ..ManagerSettings::default()
    };
    let mut m = NetworkManager::new(settings);
    add_bridge(&mut m, pos(0, 0, 0), cable(ResourceType::Item, 8));
    add_bridge(&mut m, pos(1, 0, 0), cable(ResourceType::Item, 8));
    let copper_chest = add_end_point(
        &mut m,
        pos(0, 1, 0),
        chest(ConnectionType::Provide, 64, Some(ItemStack::new(copper(), 5))),
    );
    let iron_chest = add_end_point(
        &mut m,
        pos(1, 1, 0),
        chest(ConnectionType::Consume, 64, Some(ItemStack::new(iron(), 1))),
    );

    m.tick().unwrap();
    assert_eq!(items_of(&m, copper_chest), 5);
    assert_eq!(items_of(&m, iron_chest), 1);
}
