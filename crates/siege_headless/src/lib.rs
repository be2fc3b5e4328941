//! Headless attack session runner.
//!
//! Loads a scenario and an optional combat config from RON files, plays
//! one attack session without graphics and reports what happened as JSON.
//! This enables:
//!
//! - **Scenario testing**: Check that a hand-written attack plays out as expected
//! - **CI verification**: Automated runs of the combat rules and determinism
//!
//! # Output
//!
//! - **stdout**: Session summary (JSON)
//! - **stderr**: Logs (human-readable)
//!
//! # Example
//!
//! ```bash
//! cargo run -p siege_headless -- run --scenario scenarios/outpost.ron --ticks 2000
//! ```

pub mod loader;
pub mod runner;

pub use loader::{load_config, load_config_or_default, load_scenario, LoadError};
pub use runner::{run_session, verify_scenario, RunConfig, SessionSummary, SquadSummary, VerifyReport};
