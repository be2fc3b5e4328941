//! Tunable combat constants.

use serde::{Deserialize, Serialize};

use crate::combat::DefenseModel;
use crate::components::RangeProfile;
use crate::error::{Result, SiegeError};
use crate::math::{decimal_serde, deg_to_rad, Fixed};
use crate::range::{RangeRadii, SightCone};

/// Baseline stats of a turret spawned from a completed turret base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurretStats {
    /// Maximum HP.
    #[serde(with = "decimal_serde")]
    pub max_hp: Fixed,
    /// Attack per range.
    pub attack: RangeProfile,
    /// Defense per range.
    pub defense: RangeProfile,
    /// Seconds between shots.
    #[serde(with = "decimal_serde")]
    pub shooting_period: Fixed,
}

impl Default for TurretStats {
    fn default() -> Self {
        Self {
            max_hp: Fixed::from_num(80),
            attack: RangeProfile::from_ints(8, 6, 4, 0),
            defense: RangeProfile::from_ints(2, 2, 2, 0),
            shooting_period: Fixed::ONE,
        }
    }
}

/// Rules applied by the roster between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterRules {
    /// Friendship points at which two soldiers count as friends.
    pub friendship_threshold: u32,
    /// Attack and defense bonus per friend in the same squad.
    #[serde(with = "decimal_serde")]
    pub friendship_bonus: Fixed,
    /// Attack and defense penalty while mourning.
    #[serde(with = "decimal_serde")]
    pub mourning_penalty: Fixed,
    /// Days a soldier mourns a dead friend.
    pub mourning_days: u32,
    /// Percentage of max HP restored by a day of rest.
    pub rest_heal_percent: u32,
    /// Experience needed per level.
    pub xp_per_level: u32,
    /// Max HP gained per level.
    #[serde(with = "decimal_serde")]
    pub level_hp_bonus: Fixed,
}

impl Default for RosterRules {
    fn default() -> Self {
        Self {
            friendship_threshold: 3,
            friendship_bonus: Fixed::ONE,
            mourning_penalty: Fixed::ONE,
            mourning_days: 2,
            rest_heal_percent: 25,
            xp_per_level: 100,
            level_hp_bonus: Fixed::from_num(5),
        }
    }
}

/// Combat configuration.
///
/// Every field has a default, so a config file only lists what it
/// overrides.
///
/// # Example RON
///
/// ```ron
/// CombatConfig(
///     radii: RangeRadii(short: 5.0, middle: 10.0, long: 16.0),
///     defense_model: ShortRangeOnly,
///     rng_seed: 7,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Range band radii.
    pub radii: RangeRadii,
    /// Half angle of every sight cone, in degrees.
    #[serde(with = "decimal_serde")]
    pub sight_half_angle: Fixed,
    /// Squad facing turn rate, degrees per second.
    #[serde(with = "decimal_serde")]
    pub squad_turn_rate: Fixed,
    /// Turret facing turn rate, degrees per second.
    #[serde(with = "decimal_serde")]
    pub turret_turn_rate: Fixed,
    /// Soldier facing turn rate, degrees per second.
    #[serde(with = "decimal_serde")]
    pub soldier_turn_rate: Fixed,
    /// Builder search radius as a multiple of the short radius.
    #[serde(with = "decimal_serde")]
    pub builder_radius_factor: Fixed,
    /// Seconds to build a turret base.
    #[serde(with = "decimal_serde")]
    pub turret_build_time: Fixed,
    /// Seconds to build an explosive charge.
    #[serde(with = "decimal_serde")]
    pub explosives_build_time: Fixed,
    /// Seconds to build a headquarters.
    #[serde(with = "decimal_serde")]
    pub headquarters_build_time: Fixed,
    /// Seconds between arming and detonation.
    #[serde(with = "decimal_serde")]
    pub explosive_countdown: Fixed,
    /// Damage dealt by a detonation.
    #[serde(with = "decimal_serde")]
    pub explosive_damage: Fixed,
    /// Splash radius as a multiple of the short radius.
    #[serde(with = "decimal_serde")]
    pub explosive_splash_factor: Fixed,
    /// Distance from the headquarters at which a retreat completes.
    #[serde(with = "decimal_serde")]
    pub hq_arrival_radius: Fixed,
    /// Largest ring searched when a squad is displaced, in cells.
    pub displacement_max_radius: u32,
    /// Terrain cell edge length.
    #[serde(with = "decimal_serde")]
    pub cell_size: Fixed,
    /// HP per second restored by a field medic.
    #[serde(with = "decimal_serde")]
    pub field_heal_rate: Fixed,
    /// Which defense value reduces a hit.
    pub defense_model: DefenseModel,
    /// Seed of the session random number generator.
    pub rng_seed: u64,
    /// Days a turret stays in service.
    pub turret_turns: u32,
    /// Turret baseline stats.
    pub turret: TurretStats,
    /// Roster rules.
    pub roster: RosterRules,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            radii: RangeRadii::default(),
            sight_half_angle: Fixed::from_num(30),
            squad_turn_rate: Fixed::from_num(180),
            turret_turn_rate: Fixed::from_num(40),
            soldier_turn_rate: Fixed::from_num(360),
            builder_radius_factor: Fixed::from_num(1.2),
            turret_build_time: Fixed::from_num(10),
            explosives_build_time: Fixed::from_num(6),
            headquarters_build_time: Fixed::from_num(20),
            explosive_countdown: Fixed::from_num(5),
            explosive_damage: Fixed::from_num(60),
            explosive_splash_factor: Fixed::from_num(0.5),
            hq_arrival_radius: Fixed::from_num(15),
            displacement_max_radius: 5,
            cell_size: Fixed::from_num(2),
            field_heal_rate: Fixed::from_num(4),
            defense_model: DefenseModel::default(),
            rng_seed: 0x5EED,
            turret_turns: 3,
            turret: TurretStats::default(),
            roster: RosterRules::default(),
        }
    }
}

impl CombatConfig {
    /// Parse a RON config and validate it.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|e| SiegeError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !self.radii.is_valid() {
            return Err(SiegeError::ConfigParse(
                "range radii must be positive and strictly increasing".to_string(),
            ));
        }
        if self.cell_size <= Fixed::ZERO {
            return Err(SiegeError::ConfigParse("cell_size must be positive".to_string()));
        }
        let durations = [
            self.turret_build_time,
            self.explosives_build_time,
            self.headquarters_build_time,
            self.turret.shooting_period,
        ];
        if durations.iter().any(|d| *d <= Fixed::ZERO) {
            return Err(SiegeError::ConfigParse(
                "build times and shooting periods must be positive".to_string(),
            ));
        }
        if self.turret.max_hp <= Fixed::ZERO {
            return Err(SiegeError::ConfigParse("turret max_hp must be positive".to_string()));
        }
        Ok(())
    }

    /// Sight cone built from the configured half angle.
    #[must_use]
    pub fn sight_cone(&self) -> SightCone {
        SightCone::from_degrees(self.sight_half_angle)
    }

    /// Radius within which a builder contributes progress.
    #[must_use]
    pub fn builder_radius(&self) -> Fixed {
        self.radii.short * self.builder_radius_factor
    }

    /// Radius of an explosive blast.
    #[must_use]
    pub fn splash_radius(&self) -> Fixed {
        self.radii.short * self.explosive_splash_factor
    }

    /// Largest turn of a squad in one tick, in radians.
    #[must_use]
    pub fn squad_turn_step(&self, dt: Fixed) -> Fixed {
        deg_to_rad(self.squad_turn_rate) * dt
    }

    /// Largest turn of a turret in one tick, in radians.
    #[must_use]
    pub fn turret_turn_step(&self, dt: Fixed) -> Fixed {
        deg_to_rad(self.turret_turn_rate) * dt
    }

    /// Largest turn of a soldier in one tick, in radians.
    #[must_use]
    pub fn soldier_turn_step(&self, dt: Fixed) -> Fixed {
        deg_to_rad(self.soldier_turn_rate) * dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CombatConfig::default();
        assert_eq!(config.radii, RangeRadii::from_ints(6, 12, 18));
        assert_eq!(config.explosive_countdown, Fixed::from_num(5));
        assert_eq!(config.defense_model, DefenseModel::MatchingRange);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = CombatConfig::from_ron_str(
            "(radii: (short: 5.0, middle: 10.0, long: 16.0), defense_model: ShortRangeOnly, rng_seed: 7)",
        )
        .expect("config should parse");

        assert_eq!(config.radii, RangeRadii::from_ints(5, 10, 16));
        assert_eq!(config.defense_model, DefenseModel::ShortRangeOnly);
        assert_eq!(config.rng_seed, 7);
        assert_eq!(config.turret_turns, 3);
        assert_eq!(config.roster.xp_per_level, 100);
    }

    #[test]
    fn test_invalid_radii_rejected() {
        let err = CombatConfig::from_ron_str("(radii: (short: 10.0, middle: 8.0, long: 16.0))")
            .expect_err("decreasing radii must fail");
        assert!(matches!(err, SiegeError::ConfigParse(_)));
    }

    #[test]
    fn test_malformed_ron_rejected() {
        assert!(matches!(
            CombatConfig::from_ron_str("(radii: "),
            Err(SiegeError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_derived_radii() {
        let config = CombatConfig::default();
        assert_eq!(config.splash_radius(), Fixed::from_num(3));
        assert!((config.builder_radius() - Fixed::from_num(7.2)).abs() < Fixed::from_num(0.0001));
    }
}
