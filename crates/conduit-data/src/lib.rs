//! Data-driven configuration for Conduit: manager settings and cable tiers
//! loaded from RON, TOML or JSON files.

pub mod config;
pub mod loader;

pub use config::{ConduitConfig, load_config, load_config_dir};
pub use loader::DataLoadError;
