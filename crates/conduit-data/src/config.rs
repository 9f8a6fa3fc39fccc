//! The top-level configuration file: manager settings plus cable tiers.
//!
//! A config file may omit either section. Missing settings fall back to
//! [`ManagerSettings::default`], a missing tier list to
//! [`CableTier::defaults`].

use std::collections::HashSet;
use std::path::Path;

use conduit_core::config::{CableTier, ManagerSettings};
use conduit_core::manager::NetworkManager;
use conduit_core::node::Bridge;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::loader::{DataLoadError, deserialize_file, find_data_file};

/// Base name looked up by [`load_config_dir`].
pub const CONFIG_BASE_NAME: &str = "conduit";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConduitConfig {
    pub settings: ManagerSettings,
    pub cable_tiers: Vec<CableTier>,
}

impl Default for ConduitConfig {
    fn default() -> Self {
        Self {
            settings: ManagerSettings::default(),
            cable_tiers: CableTier::defaults(),
        }
    }
}

impl ConduitConfig {
    /// Reject tier lists that name the same tier twice. `file` is only used
    /// for error reporting.
    pub fn validate(&self, file: &Path) -> Result<(), DataLoadError> {
        let mut seen = HashSet::new();
        for tier in &self.cable_tiers {
            if !seen.insert(tier.name.as_str()) {
                return Err(DataLoadError::DuplicateTier {
                    file: file.to_path_buf(),
                    name: tier.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn tier(&self, name: &str) -> Result<&CableTier, DataLoadError> {
        self.cable_tiers
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| DataLoadError::UnknownTier { name: name.to_string() })
    }

    /// An all-resource cable of the named tier.
    pub fn bridge(&self, tier: &str) -> Result<Bridge, DataLoadError> {
        Ok(self.tier(tier)?.bridge())
    }

    /// A fresh manager using these settings.
    pub fn manager(&self) -> NetworkManager {
        NetworkManager::new(self.settings.clone())
    }
}

/// Load and validate a config file; the format follows the extension.
pub fn load_config(path: &Path) -> Result<ConduitConfig, DataLoadError> {
    let config: ConduitConfig = deserialize_file(path)?;
    config.validate(path)?;
    info!(
        file = %path.display(),
        tiers = config.cable_tiers.len(),
        "conduit config loaded"
    );
    Ok(config)
}

/// Load `conduit.{ron,toml,json}` from `dir`, or the defaults when none exists.
pub fn load_config_dir(dir: &Path) -> Result<ConduitConfig, DataLoadError> {
    match find_data_file(dir, CONFIG_BASE_NAME)? {
        Some(path) => load_config(&path),
        None => {
            debug!(dir = %dir.display(), "no conduit config found, using defaults");
            Ok(ConduitConfig::default())
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
