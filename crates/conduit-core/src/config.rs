//! Runtime settings and cable tier definitions.
//!
//! Both types are plain serde values so `conduit-data` can load them from
//! RON, TOML or JSON. The defaults are what the manager uses when nothing is
//! configured.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::direction::DirectionSet;
use crate::id::ResourceType;
use crate::node::{Bridge, TransferRates};

// ---------------------------------------------------------------------------
// Manager settings
// ---------------------------------------------------------------------------

/// Scheduling knobs for the manager and its coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Item networks run on every tick whose number is a multiple of this.
    pub item_tick_interval: u64,
    /// How long the async worker sleeps when its queue is empty.
    pub worker_poll_interval_ms: u64,
}

impl ManagerSettings {
    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            item_tick_interval: 20,
            worker_poll_interval_ms: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// Cable tiers
// ---------------------------------------------------------------------------

/// A named set of per-resource bridge ceilings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CableTier {
    pub name: String,
    pub energy_rate: u64,
    pub item_rate: u32,
    pub fluid_rate: u64,
}

impl CableTier {
    pub fn new(name: impl Into<String>, energy_rate: u64, item_rate: u32, fluid_rate: u64) -> Self {
        Self {
            name: name.into(),
            energy_rate,
            item_rate,
            fluid_rate,
        }
    }

    pub fn rates(&self) -> TransferRates {
        TransferRates {
            energy: self.energy_rate,
            item: self.item_rate,
            fluid: self.fluid_rate,
        }
    }

    /// A cable of this tier carrying every resource on all faces.
    pub fn bridge(&self) -> Bridge {
        Bridge::new(self.rates())
    }

    /// A cable of this tier restricted to `resources` and `faces`.
    pub fn bridge_with(&self, resources: &[ResourceType], faces: DirectionSet) -> Bridge {
        Bridge::new(self.rates()).with_resources(resources).with_faces(faces)
    }

    /// The five stock tiers, slowest first. The creative tier is unbounded.
    pub fn defaults() -> Vec<CableTier> {
        vec![
            CableTier::new("basic", 1_000, 1, 50),
            CableTier::new("advanced", 5_000, 4, 200),
            CableTier::new("elite", 20_000, 16, 1_000),
            CableTier::new("ultimate", 100_000, 64, 5_000),
            CableTier::new("creative", u64::MAX, u32::MAX, u64::MAX),
        ]
    }
}
