//! Shared data types.
//!
//! Components are plain data used by every entity kind: identifiers,
//! range classification, attack/defense profiles, capability sets and
//! movement-speed modifiers.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::math::{decimal_serde, Fixed};

/// Unique identifier for session entities (units, turrets, towers, build sites).
pub type EntityId = u64;

/// Persistent identifier of a roster soldier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SoldierId(pub u32);

/// Persistent identifier of a roster squad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SquadId(pub u32);

impl std::fmt::Display for SoldierId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "soldier#{}", self.0)
    }
}

impl std::fmt::Display for SquadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "squad#{}", self.0)
    }
}

// ============================================================================
// Ranges
// ============================================================================

/// Which attack/defense value of a [`RangeProfile`] applies to a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RangeKind {
    /// Close quarters.
    Short,
    /// Mid distance.
    Middle,
    /// Maximum weapon distance.
    Long,
    /// Explosive blast (charges only).
    Explosive,
}

impl RangeKind {
    /// The three ranges a squad can prefer, nearest first.
    pub const DISTANCES: [RangeKind; 3] = [RangeKind::Short, RangeKind::Middle, RangeKind::Long];
}

/// Result of classifying the distance between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeClass {
    /// Within the short radius.
    Short,
    /// Within the middle radius.
    Middle,
    /// Within the long radius.
    Long,
    /// Beyond every configured radius.
    OutOfRange,
}

impl RangeClass {
    /// The range kind used for damage at this distance, if any.
    #[must_use]
    pub const fn kind(self) -> Option<RangeKind> {
        match self {
            RangeClass::Short => Some(RangeKind::Short),
            RangeClass::Middle => Some(RangeKind::Middle),
            RangeClass::Long => Some(RangeKind::Long),
            RangeClass::OutOfRange => None,
        }
    }

    /// Check whether the distance is inside any radius.
    #[must_use]
    pub const fn is_in_range(self) -> bool {
        !matches!(self, RangeClass::OutOfRange)
    }
}

/// Attack or defense values per range kind.
///
/// Values are clamped to be non-negative whenever a profile is built
/// from bonuses, so a penalty can never turn into healing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RangeProfile {
    /// Short range value.
    #[serde(with = "decimal_serde", default)]
    pub short: Fixed,
    /// Middle range value.
    #[serde(with = "decimal_serde", default)]
    pub middle: Fixed,
    /// Long range value.
    #[serde(with = "decimal_serde", default)]
    pub long: Fixed,
    /// Explosive value.
    #[serde(with = "decimal_serde", default)]
    pub explosive: Fixed,
}

impl RangeProfile {
    /// All zero.
    pub const ZERO: Self = Self {
        short: Fixed::ZERO,
        middle: Fixed::ZERO,
        long: Fixed::ZERO,
        explosive: Fixed::ZERO,
    };

    /// Create a profile from integer values.
    #[must_use]
    pub fn from_ints(short: i32, middle: i32, long: i32, explosive: i32) -> Self {
        Self {
            short: Fixed::from_num(short),
            middle: Fixed::from_num(middle),
            long: Fixed::from_num(long),
            explosive: Fixed::from_num(explosive),
        }
    }

    /// Same value for every range.
    #[must_use]
    pub fn uniform(value: Fixed) -> Self {
        Self {
            short: value,
            middle: value,
            long: value,
            explosive: value,
        }
    }

    /// Value for a range kind.
    #[must_use]
    pub const fn get(&self, kind: RangeKind) -> Fixed {
        match kind {
            RangeKind::Short => self.short,
            RangeKind::Middle => self.middle,
            RangeKind::Long => self.long,
            RangeKind::Explosive => self.explosive,
        }
    }

    /// Mutable value for a range kind.
    pub fn get_mut(&mut self, kind: RangeKind) -> &mut Fixed {
        match kind {
            RangeKind::Short => &mut self.short,
            RangeKind::Middle => &mut self.middle,
            RangeKind::Long => &mut self.long,
            RangeKind::Explosive => &mut self.explosive,
        }
    }

    /// Component-wise sum.
    #[must_use]
    pub fn plus(&self, other: &Self) -> Self {
        Self {
            short: self.short + other.short,
            middle: self.middle + other.middle,
            long: self.long + other.long,
            explosive: self.explosive + other.explosive,
        }
    }

    /// Every component floored at zero.
    #[must_use]
    pub fn clamped(&self) -> Self {
        Self {
            short: self.short.max(Fixed::ZERO),
            middle: self.middle.max(Fixed::ZERO),
            long: self.long.max(Fixed::ZERO),
            explosive: self.explosive.max(Fixed::ZERO),
        }
    }
}

// ============================================================================
// Capabilities
// ============================================================================

bitflags! {
    /// Tagged abilities of a soldier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Capabilities: u16 {
        /// Restores squad-mates' HP in the field.
        const HEAL = 1 << 0;
        /// Contributes progress to turret bases.
        const TURRET_BUILD = 1 << 1;
        /// Contributes progress to explosive charges.
        const EXPLOSIVES = 1 << 2;
        /// Contributes progress to a new headquarters.
        const HQ_BUILD = 1 << 3;
        /// Raises the squad's movement speed.
        const INCREASE_SPEED = 1 << 4;
        /// Saves downed squad-mates from dying at day end.
        const WOUNDED_SAVING = 1 << 5;
    }
}

// ============================================================================
// Health
// ============================================================================

/// Health pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    #[serde(with = "decimal_serde")]
    pub current: Fixed,
    /// Maximum health points.
    #[serde(with = "decimal_serde")]
    pub max: Fixed,
}

impl Health {
    /// Create new health at full.
    #[must_use]
    pub const fn new(max: Fixed) -> Self {
        Self { current: max, max }
    }

    /// Create health with an explicit current value, clamped into `[0, max]`.
    #[must_use]
    pub fn with_current(current: Fixed, max: Fixed) -> Self {
        Self {
            current: current.max(Fixed::ZERO).min(max),
            max,
        }
    }

    /// Check if the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current <= Fixed::ZERO
    }

    /// Remove HP, floored at zero. Returns the amount actually removed.
    pub fn apply_damage(&mut self, amount: Fixed) -> Fixed {
        let actual = amount.max(Fixed::ZERO).min(self.current);
        self.current -= actual;
        actual
    }

    /// Restore HP, capped at max. Returns the amount actually restored.
    pub fn heal(&mut self, amount: Fixed) -> Fixed {
        let headroom = (self.max - self.current).max(Fixed::ZERO);
        let actual = amount.max(Fixed::ZERO).min(headroom);
        self.current += actual;
        actual
    }

    /// Missing HP.
    #[must_use]
    pub fn missing(&self) -> Fixed {
        (self.max - self.current).max(Fixed::ZERO)
    }
}

// ============================================================================
// Speed Modifiers
// ============================================================================

/// Exact rational speed multiplier.
///
/// Wound penalties are applied and removed by multiplying and dividing
/// by the same factor. Keeping the product as a reduced fraction makes
/// that round trip exact, which a fixed-point multiply/divide is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpeedFactor {
    numerator: u64,
    denominator: u64,
}

impl SpeedFactor {
    /// No modification.
    pub const ONE: Self = Self {
        numerator: 1,
        denominator: 1,
    };

    /// Penalty applied while a soldier is wounded (×0.9).
    pub const WOUNDED: Self = Self {
        numerator: 9,
        denominator: 10,
    };

    /// Bonus from an `INCREASE_SPEED` soldier (×1.1).
    pub const BOOSTED: Self = Self {
        numerator: 11,
        denominator: 10,
    };

    /// Create a reduced fraction.
    ///
    /// # Panics
    ///
    /// Panics if `denominator` is zero.
    #[must_use]
    pub fn new(numerator: u64, denominator: u64) -> Self {
        assert!(denominator > 0, "SpeedFactor denominator must be positive");
        let divisor = gcd(numerator, denominator).max(1);
        Self {
            numerator: numerator / divisor,
            denominator: denominator / divisor,
        }
    }

    /// Numerator of the reduced fraction.
    #[must_use]
    pub const fn numerator(&self) -> u64 {
        self.numerator
    }

    /// Denominator of the reduced fraction.
    #[must_use]
    pub const fn denominator(&self) -> u64 {
        self.denominator
    }

    /// Multiply by another factor.
    #[must_use]
    pub fn times(self, other: Self) -> Self {
        Self::new(
            self.numerator * other.numerator,
            self.denominator * other.denominator,
        )
    }

    /// Divide by another factor.
    #[must_use]
    pub fn divided_by(self, other: Self) -> Self {
        Self::new(
            self.numerator * other.denominator,
            self.denominator * other.numerator,
        )
    }

    /// Apply to a base speed.
    #[must_use]
    pub fn apply(self, base: Fixed) -> Fixed {
        base * Fixed::from_num(self.numerator) / Fixed::from_num(self.denominator)
    }
}

impl Default for SpeedFactor {
    fn default() -> Self {
        Self::ONE
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    #[test]
    fn test_range_profile_get_and_clamp() {
        let profile = RangeProfile::from_ints(5, -2, 0, 7);
        assert_eq!(profile.get(RangeKind::Short), fixed(5));
        assert_eq!(profile.get(RangeKind::Explosive), fixed(7));

        let clamped = profile.clamped();
        assert_eq!(clamped.middle, Fixed::ZERO);
        assert_eq!(clamped.short, fixed(5));
    }

    #[test]
    fn test_health_floors_and_caps() {
        let mut health = Health::new(fixed(50));
        assert_eq!(health.apply_damage(fixed(80)), fixed(50));
        assert!(health.is_empty());

        assert_eq!(health.heal(fixed(70)), fixed(50));
        assert_eq!(health.current, fixed(50));
    }

    #[test]
    fn test_speed_factor_wound_round_trip_is_exact() {
        let base = fixed(7);
        let wounded = SpeedFactor::ONE.times(SpeedFactor::WOUNDED);
        assert_eq!(wounded, SpeedFactor::new(9, 10));

        let healed = wounded.divided_by(SpeedFactor::WOUNDED);
        assert_eq!(healed, SpeedFactor::ONE);
        assert_eq!(healed.apply(base), base);
    }

    #[test]
    fn test_speed_factor_stacks() {
        let two_wounds = SpeedFactor::WOUNDED.times(SpeedFactor::WOUNDED);
        assert_eq!(two_wounds, SpeedFactor::new(81, 100));
        assert_eq!(SpeedFactor::BOOSTED.apply(fixed(10)), fixed(11));
    }

    #[test]
    fn test_capabilities_contains() {
        let caps = Capabilities::HEAL | Capabilities::EXPLOSIVES;
        assert!(caps.contains(Capabilities::HEAL));
        assert!(!caps.contains(Capabilities::TURRET_BUILD));
    }
}
