//! Monitor Configuration Module
//!
//! Operator-tunable configuration loaded from TOML, replacing hardcoded
//! thresholds and intervals with deployment-specific values.
//!
//! ## Loading Order
//!
//! 1. `SENTINEL_CONFIG` environment variable (path to TOML file)
//! 2. `sentinel.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded [`MonitorConfig`] is handed to each component at wiring
//! time; there is no process-global config state.

mod monitor_config;
pub mod defaults;

pub use monitor_config::*;
