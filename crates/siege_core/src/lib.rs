//! # Siege Core
//!
//! Deterministic combat core for Siege Squads.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness (a seeded `ChaCha8Rng` picks displacement cells)
//! - No floating-point math (uses fixed-point)
//!
//! Movement, terrain and progress bars are external services reached
//! through the traits in [`navigation`].
//!
//! ## Crate Structure
//!
//! - [`components`] - Identifiers, range profiles, health, capabilities
//! - [`range`] - Range classification, sight cones, nearest-candidate search
//! - [`combat`] - Combatants and damage resolution
//! - [`buildings`] - Construction sites, turret bases and explosives
//! - [`squad`], [`roster`] - Persistent squads and soldiers
//! - [`squad_unit`], [`soldier_unit`] - Deployed squads and soldiers
//! - [`turret`], [`hostiles`] - Turrets, towers and enemies
//! - [`simulation`] - Session context and tick loop
//! - [`events`] - Notification channels and death propagation
//! - [`data`] - RON configuration and scenarios
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod buildings;
pub mod combat;
pub mod components;
pub mod data;
pub mod error;
pub mod events;
pub mod hostiles;
pub mod math;
pub mod navigation;
pub mod range;
pub mod roster;
pub mod simulation;
pub mod soldier_unit;
pub mod squad;
pub mod squad_unit;
pub mod turret;

#[cfg(test)]
mod testing;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::buildings::{BuildState, Buildable, SiteKind};
    pub use crate::combat::{Combatant, DefenseModel, Damageable, Targeting};
    pub use crate::components::*;
    pub use crate::data::{CombatConfig, ScenarioData};
    pub use crate::error::{Result, SiegeError};
    pub use crate::events::{Channel, GameEvent, TickEvents};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::navigation::{GridCell, GridTerrain, Mover, StraightLineMover, Terrain};
    pub use crate::range::{classify, is_in_sight, nearest_of_capability, RangeRadii};
    pub use crate::roster::{Roster, Soldier, SoldierClass};
    pub use crate::simulation::{AttackSetup, Collaborators, SessionPhase, Simulation};
    pub use crate::squad::{Formation, RangePolicy, Squad};
    pub use crate::squad_unit::SquadState;
}
