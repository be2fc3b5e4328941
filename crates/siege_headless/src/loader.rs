//! Scenario and config loading from disk.

use std::fs;
use std::path::Path;

use siege_core::data::{CombatConfig, ScenarioData};
use siege_core::error::SiegeError;
use thiserror::Error;

/// Errors raised while loading or running a scenario.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A file could not be read.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// A file is not valid RON for the expected type.
    #[error("Failed to parse RON: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The data parsed but the combat core rejected it.
    #[error("Invalid scenario: {0}")]
    Siege(#[from] SiegeError),
}

/// Load and validate a scenario file.
pub fn load_scenario(path: &Path) -> Result<ScenarioData, LoadError> {
    let content = fs::read_to_string(path)?;
    let scenario: ScenarioData = ron::from_str(&content)?;
    scenario.validate()?;
    tracing::debug!(path = %path.display(), name = %scenario.name, "Scenario loaded");
    Ok(scenario)
}

/// Load and validate a combat config file.
pub fn load_config(path: &Path) -> Result<CombatConfig, LoadError> {
    let content = fs::read_to_string(path)?;
    let config: CombatConfig = ron::from_str(&content)?;
    config.validate()?;
    tracing::debug!(path = %path.display(), "Combat config loaded");
    Ok(config)
}

/// Load a config file if one was given, the defaults otherwise.
pub fn load_config_or_default(path: Option<&Path>) -> Result<CombatConfig, LoadError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(CombatConfig::default()),
    }
}
