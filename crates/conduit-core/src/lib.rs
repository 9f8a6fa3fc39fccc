//! Conduit Core -- runtime topology manager for typed resource networks.
//!
//! Spatial nodes (bridges such as cables, endpoints such as machines and
//! batteries) are announced to a [`manager::NetworkManager`], which keeps them
//! grouped into connected networks per resource type (energy, items, fluid)
//! and redistributes each resource among network members once per tick.
//!
//! # Lifecycle
//!
//! ```rust,ignore
//! let mut manager = NetworkManager::default();
//! let cable = manager.insert_bridge(pos, CableTier::defaults()[0].bridge())?;
//! manager.handle_bridge_add(cable)?;
//! manager.tick()?;
//! for event in manager.drain_events() { /* redraw refreshed bridges */ }
//! ```
//!
//! Concurrent embedders wrap the manager in a [`coordinator::Coordinator`],
//! which serialises ticks, deferred tasks and a worker thread behind one
//! mutex.
//!
//! # Key Types
//!
//! - [`node::Node`] -- a bridge or an endpoint plus its adjacency.
//! - [`network::Network`] -- the energy, item or fluid network variants.
//! - [`share`] -- the equal-share settlement used by energy and fluid.
//! - [`event::NetworkEvent`] -- bridge refreshes and network lifecycle.
//! - [`debug::DebugFeed`] -- per-type viewer subscriptions and traces.
//! - [`snapshot::HolderSnapshot`] -- versioned holder state via bitcode.

pub mod config;
pub mod coordinator;
pub mod debug;
pub mod direction;
pub mod error;
pub mod event;
pub mod holder;
pub mod id;
pub mod manager;
pub mod network;
pub mod node;
pub mod share;
pub mod snapshot;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
