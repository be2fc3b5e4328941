//! Error types for the combat core.

use thiserror::Error;

use crate::components::EntityId;

/// Result type alias using [`SiegeError`].
pub type Result<T> = std::result::Result<T, SiegeError>;

/// Top-level error type for combat core setup and commands.
///
/// Per-tick failures never surface through this type; systems log them
/// and keep the affected entity in place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SiegeError {
    /// No headquarters position was configured.
    #[error("No headquarters configured")]
    MissingHeadquarters,

    /// No walkable spawn cell is available.
    #[error("No eligible spawn cells")]
    NoSpawnCells,

    /// Every attack cell around a tower is taken or unwalkable.
    #[error("No attack position found around tower {tower}")]
    NoAttackPosition {
        /// Tower the squad tried to attack.
        tower: EntityId,
    },

    /// A displaced squad found no free cell nearby.
    #[error("No replacement cell found for squad unit {squad}")]
    NoReplacementCell {
        /// Displaced squad unit.
        squad: EntityId,
    },

    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(u64),

    /// Invalid roster squad identifier.
    #[error("Unknown squad: {0}")]
    UnknownSquad(u32),

    /// Invalid roster soldier identifier.
    #[error("Unknown soldier: {0}")]
    UnknownSoldier(u32),

    /// Every slot of the squad is filled.
    #[error("Squad has no free slot")]
    SquadFull,

    /// The command is not allowed while an attack session is running.
    #[error("An attack session is already active")]
    SessionActive,

    /// No squad of the roster is engaged.
    #[error("No engaged squads to deploy")]
    NoEngagedSquads,

    /// Configuration text could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),
}
