//! Data structures for combat configuration and scenarios.
//!
//! Everything here is plain serde data designed to be read from RON.
//!
//! **Note:** This module contains no IO - it only defines data types.
//! File loading is handled by `siege_headless`.

mod combat_config;
mod scenario_data;

pub use combat_config::{CombatConfig, RosterRules, TurretStats};
pub use scenario_data::{
    EnemyData, GridData, Order, RosterData, ScenarioData, SiteData, TowerData,
};
