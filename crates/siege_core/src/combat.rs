//! Shared HP, attack, defense and shooting behaviour.
//!
//! Soldiers, turrets, towers and enemies all wrap a [`Combatant`]. The
//! simulation dispatches to them through the [`Damageable`] and
//! [`Targeting`] traits instead of an inheritance chain.
//!
//! Damage follows a flat law:
//!
//! ```text
//! dealt = min(max(amount - defense[range], 0), current_hp)
//! ```
//!
//! Reaching zero HP marks the combatant down. A down combatant ignores
//! further damage and target changes until it is healed.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Health, RangeClass, RangeKind, RangeProfile};
use crate::events::{DeathWatch, GameEvent};
use crate::math::Fixed;

/// Which defense value reduces a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DefenseModel {
    /// A hit at range R is reduced by defense[R].
    #[default]
    MatchingRange,
    /// Every hit is reduced by the short-range defense, whatever its range.
    ShortRangeOnly,
}

impl DefenseModel {
    /// Defense applied to a hit of the given kind.
    #[must_use]
    pub const fn defense_for(self, defense: &RangeProfile, kind: RangeKind) -> Fixed {
        match self {
            DefenseModel::MatchingRange => defense.get(kind),
            DefenseModel::ShortRangeOnly => defense.short,
        }
    }
}

/// Result of a single [`Combatant::apply_damage`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DamageOutcome {
    /// HP actually removed.
    pub dealt: Fixed,
    /// HP crossed from above zero to zero with this hit.
    pub went_down: bool,
}

/// Result of readying a shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotOutcome {
    /// Weapon still cooling down.
    NotReady,
    /// Target out of range or no attack value for its range.
    NoAttack,
    /// A hit should be delivered.
    Hit {
        /// Range band of the hit.
        kind: RangeKind,
        /// Raw attack value before the target's defense.
        amount: Fixed,
    },
}

/// HP, attack, defense and weapon timing of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combatant {
    /// Owning entity.
    pub id: EntityId,
    /// Health pool.
    pub health: Health,
    /// Attack per range.
    pub attack: RangeProfile,
    /// Defense per range.
    pub defense: RangeProfile,
    /// Seconds until the weapon is ready.
    #[serde(with = "crate::math::decimal_serde")]
    pub shooting_delay: Fixed,
    /// Seconds between shots.
    #[serde(with = "crate::math::decimal_serde")]
    pub shooting_period: Fixed,
    target: Option<EntityId>,
    down: bool,
}

impl Combatant {
    /// Create a combatant at the given health.
    #[must_use]
    pub fn new(id: EntityId, health: Health, attack: RangeProfile, defense: RangeProfile, shooting_period: Fixed) -> Self {
        Self {
            id,
            down: health.is_empty(),
            health,
            attack: attack.clamped(),
            defense: defense.clamped(),
            shooting_delay: Fixed::ZERO,
            shooting_period,
            target: None,
        }
    }

    /// Check whether the combatant is at zero HP.
    #[must_use]
    pub const fn is_down(&self) -> bool {
        self.down
    }

    /// Currently selected target.
    #[must_use]
    pub const fn target(&self) -> Option<EntityId> {
        self.target
    }

    /// Apply a hit.
    ///
    /// Always emits `HpChanged`, even for fully absorbed hits. Emits
    /// `HpDown` on the >0 to 0 crossing only. A down combatant is left
    /// untouched and emits nothing.
    pub fn apply_damage(
        &mut self,
        amount: Fixed,
        kind: RangeKind,
        model: DefenseModel,
        events: &mut Vec<GameEvent>,
    ) -> DamageOutcome {
        if self.down {
            return DamageOutcome::default();
        }

        let reduced = (amount - model.defense_for(&self.defense, kind)).max(Fixed::ZERO);
        let dealt = self.health.apply_damage(reduced);
        events.push(GameEvent::HpChanged {
            entity: self.id,
            current: self.health.current,
            max: self.health.max,
        });

        let went_down = self.health.is_empty();
        if went_down {
            self.down = true;
            events.push(GameEvent::HpDown { entity: self.id });
        }

        DamageOutcome { dealt, went_down }
    }

    /// Restore HP. Healing a down combatant above zero revives it.
    ///
    /// Returns the HP actually restored.
    pub fn heal(&mut self, amount: Fixed, events: &mut Vec<GameEvent>) -> Fixed {
        let restored = self.health.heal(amount);
        if restored > Fixed::ZERO {
            events.push(GameEvent::HpChanged {
                entity: self.id,
                current: self.health.current,
                max: self.health.max,
            });
            if !self.health.is_empty() {
                self.down = false;
            }
        }
        restored
    }

    /// Replace the current target.
    ///
    /// The old target is unwatched and the new one watched so it can be
    /// cleared on death. `None` only clears. Returns `true` if the target
    /// changed.
    pub fn try_set_target(
        &mut self,
        target: Option<EntityId>,
        watch: &mut DeathWatch,
        events: &mut Vec<GameEvent>,
    ) -> bool {
        if self.down && target.is_some() {
            return false;
        }
        if self.target == target {
            return false;
        }

        if let Some(old) = self.target.take() {
            watch.unwatch(self.id, old);
        }
        if let Some(new) = target {
            watch.watch(self.id, new);
        }
        self.target = target;
        events.push(GameEvent::TargetChanged {
            holder: self.id,
            target,
        });
        true
    }

    /// Drop the target without touching the death watch.
    ///
    /// Used when the watch entry was already consumed by a death.
    pub fn forget_target(&mut self, target: EntityId, events: &mut Vec<GameEvent>) {
        if self.target == Some(target) {
            self.target = None;
            events.push(GameEvent::TargetChanged {
                holder: self.id,
                target: None,
            });
        }
    }

    /// Advance the weapon cooldown.
    pub fn tick(&mut self, dt: Fixed) {
        self.shooting_delay = (self.shooting_delay - dt).max(Fixed::ZERO);
    }

    /// Attack range kind and value usable at a distance class.
    #[must_use]
    pub fn attack_for(&self, range: RangeClass) -> Option<(RangeKind, Fixed)> {
        let kind = range.kind()?;
        let value = self.attack.get(kind);
        (value > Fixed::ZERO).then_some((kind, value))
    }

    /// Check whether any distance band has a non-zero attack.
    #[must_use]
    pub fn can_attack_at(&self, range: RangeClass) -> bool {
        self.attack_for(range).is_some()
    }
}

/// Ready a shot from `shooter` at a target in the given distance class.
///
/// The cooldown is only reset when a hit is produced; an out-of-range or
/// zero-attack attempt leaves it untouched.
pub fn resolve_shot(shooter: &mut Combatant, range: RangeClass) -> ShotOutcome {
    if shooter.down {
        return ShotOutcome::NoAttack;
    }
    if shooter.shooting_delay > Fixed::ZERO {
        return ShotOutcome::NotReady;
    }
    let Some((kind, amount)) = shooter.attack_for(range) else {
        return ShotOutcome::NoAttack;
    };
    shooter.shooting_delay = shooter.shooting_period;
    ShotOutcome::Hit { kind, amount }
}

/// Entities that take damage.
pub trait Damageable {
    /// Shared combat state.
    fn combatant(&self) -> &Combatant;

    /// Mutable shared combat state.
    fn combatant_mut(&mut self) -> &mut Combatant;

    /// Check whether the entity still has HP.
    fn is_alive(&self) -> bool {
        !self.combatant().is_down()
    }
}

/// Entities that hold a target reference.
pub trait Targeting {
    /// Current target, if any.
    fn current_target(&self) -> Option<EntityId>;

    /// Clear the reference to a target that just went down.
    fn target_lost(&mut self, target: EntityId, events: &mut Vec<GameEvent>);
}
