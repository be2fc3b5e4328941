//! Persistent squads: membership, formation layout and stat aggregation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{Capabilities, RangeKind, RangeProfile, SoldierId, SpeedFactor, SquadId};
use crate::data::RosterRules;
use crate::error::{Result, SiegeError};
use crate::math::{decimal_serde, Fixed, Vec2Fixed};
use crate::range::RangeRadii;
use crate::roster::Soldier;

/// Soldier slots per squad.
pub const SQUAD_SIZE: usize = 4;

/// Speed reported by a squad without members.
pub const EMPTY_SQUAD_SPEED: Fixed = Fixed::from_bits(5 << 32);

/// Formation layout of a squad's four slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Formation {
    /// Side by side.
    #[default]
    Line,
    /// One behind the other.
    Column,
    /// Two by two.
    Square,
    /// Arrowhead pointing forward.
    Wedge,
}

impl Formation {
    /// Local offset of a slot (x = right, y = forward).
    #[must_use]
    pub fn offset(self, slot: usize) -> Vec2Fixed {
        let (x, y) = match (self, slot % SQUAD_SIZE) {
            (Formation::Line, 0) => (-3, 0),
            (Formation::Line, 1) => (-1, 0),
            (Formation::Line, 2) => (1, 0),
            (Formation::Line, _) => (3, 0),
            (Formation::Column, 0) => (0, 3),
            (Formation::Column, 1) => (0, 1),
            (Formation::Column, 2) => (0, -1),
            (Formation::Column, _) => (0, -3),
            (Formation::Square, 0) => (-1, 1),
            (Formation::Square, 1) => (1, 1),
            (Formation::Square, 2) => (-1, -1),
            (Formation::Square, _) => (1, -1),
            (Formation::Wedge, 0) => (0, 2),
            (Formation::Wedge, 1) => (-2, 0),
            (Formation::Wedge, 2) => (2, 0),
            (Formation::Wedge, _) => (0, -2),
        };
        Vec2Fixed::from_ints(x, y)
    }
}

/// How a squad picks its preferred attack range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RangePolicy {
    /// Range with the highest aggregate attack.
    #[default]
    MaximizeAttack,
    /// Range with the highest aggregate defense.
    MaximizeDefense,
    /// Range chosen by the player.
    PlayerChoice,
}

/// Cached aggregate stats of a squad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SquadStats {
    /// Summed attack per range.
    pub attack: RangeProfile,
    /// Summed defense per range.
    pub defense: RangeProfile,
    /// Movement speed.
    #[serde(with = "decimal_serde")]
    pub speed: Fixed,
}

impl Default for SquadStats {
    fn default() -> Self {
        Self {
            attack: RangeProfile::ZERO,
            defense: RangeProfile::ZERO,
            speed: EMPTY_SQUAD_SPEED,
        }
    }
}

/// A roster squad of up to four soldiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Squad {
    /// Persistent identifier.
    pub id: SquadId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Soldier slots.
    #[serde(default)]
    pub slots: [Option<SoldierId>; SQUAD_SIZE],
    /// Deployed in the next attack session.
    #[serde(default)]
    pub engaged: bool,
    /// Formation layout.
    #[serde(default)]
    pub formation: Formation,
    /// Preferred range selection policy.
    #[serde(default)]
    pub range_policy: RangePolicy,
    /// Range used under [`RangePolicy::PlayerChoice`].
    #[serde(default = "default_player_range")]
    pub player_range: RangeKind,
    #[serde(skip)]
    stats: SquadStats,
}

const fn default_player_range() -> RangeKind {
    RangeKind::Middle
}

impl Squad {
    /// Create an empty squad.
    #[must_use]
    pub fn new(id: SquadId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            slots: [None; SQUAD_SIZE],
            engaged: false,
            formation: Formation::default(),
            range_policy: RangePolicy::default(),
            player_range: default_player_range(),
            stats: SquadStats::default(),
        }
    }

    /// Non-empty slots with their slot index.
    pub fn members(&self) -> impl Iterator<Item = (usize, SoldierId)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, member)| member.map(|id| (slot, id)))
    }

    /// Number of filled slots.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Check whether a soldier fills one of the slots.
    #[must_use]
    pub fn contains(&self, soldier: SoldierId) -> bool {
        self.slots.contains(&Some(soldier))
    }

    /// Put a soldier in the first free slot. Returns the slot index.
    pub fn add_member(&mut self, soldier: SoldierId) -> Result<usize> {
        if let Some(slot) = self.slots.iter().position(|s| *s == Some(soldier)) {
            return Ok(slot);
        }
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(SiegeError::SquadFull)?;
        self.slots[slot] = Some(soldier);
        Ok(slot)
    }

    /// Empty the slot holding a soldier. Returns `false` if not a member.
    pub fn remove_member(&mut self, soldier: SoldierId) -> bool {
        match self.slots.iter_mut().find(|s| **s == Some(soldier)) {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    /// Cached aggregate stats.
    #[must_use]
    pub const fn stats(&self) -> &SquadStats {
        &self.stats
    }

    /// Replace the cached stats.
    pub(crate) fn set_stats(&mut self, stats: SquadStats) {
        self.stats = stats;
    }

    /// Range the squad prefers to attack from.
    ///
    /// Ties between ranges resolve to the nearer one.
    #[must_use]
    pub fn preferred_range(&self) -> RangeKind {
        let best_of = |profile: &RangeProfile| {
            let mut best = RangeKind::Short;
            for kind in RangeKind::DISTANCES {
                if profile.get(kind) > profile.get(best) {
                    best = kind;
                }
            }
            best
        };
        match self.range_policy {
            RangePolicy::MaximizeAttack => best_of(&self.stats.attack),
            RangePolicy::MaximizeDefense => best_of(&self.stats.defense),
            RangePolicy::PlayerChoice => match self.player_range {
                RangeKind::Explosive => RangeKind::Short,
                kind => kind,
            },
        }
    }

    /// Distance within which a holding squad stops at its current cell.
    #[must_use]
    pub fn max_stop_range(&self, radii: &RangeRadii) -> Fixed {
        radii.radius(self.preferred_range())
    }
}

/// Bonus profile that touches the three distance ranges only.
fn distance_bonus(value: Fixed) -> RangeProfile {
    RangeProfile {
        short: value,
        middle: value,
        long: value,
        explosive: Fixed::ZERO,
    }
}

/// Friendship and mourning adjustment of one soldier in its squad.
#[must_use]
pub fn member_bonus(
    soldier: &Soldier,
    squad: &Squad,
    rules: &RosterRules,
) -> Fixed {
    let friends = squad
        .members()
        .filter(|(_, other)| *other != soldier.id)
        .filter(|(_, other)| soldier.friendship_with(*other) >= rules.friendship_threshold)
        .count();
    let mut bonus = rules.friendship_bonus * Fixed::from_num(friends);
    if soldier.mourning_days > 0 {
        bonus -= rules.mourning_penalty;
    }
    bonus
}

/// Attack and defense of one soldier with squad bonuses applied.
#[must_use]
pub fn effective_profiles(soldier: &Soldier, squad: &Squad, rules: &RosterRules) -> (RangeProfile, RangeProfile) {
    let bonus = distance_bonus(member_bonus(soldier, squad, rules));
    (
        soldier.attack.plus(&bonus).clamped(),
        soldier.defense.plus(&bonus).clamped(),
    )
}

/// Recompute a squad's aggregate stats from its members.
#[must_use]
pub fn aggregate(squad: &Squad, soldiers: &BTreeMap<SoldierId, Soldier>, rules: &RosterRules) -> SquadStats {
    let mut attack = RangeProfile::ZERO;
    let mut defense = RangeProfile::ZERO;
    let mut speed: Option<Fixed> = None;
    let mut boosted = false;

    for soldier in squad.members().filter_map(|(_, id)| soldiers.get(&id)) {
        let (member_attack, member_defense) = effective_profiles(soldier, squad, rules);
        attack = attack.plus(&member_attack);
        defense = defense.plus(&member_defense);
        speed = Some(speed.map_or(soldier.speed, |s| s.min(soldier.speed)));
        if soldier.is_alive() && soldier.capabilities.contains(Capabilities::INCREASE_SPEED) {
            boosted = true;
        }
    }

    let mut speed = speed.unwrap_or(EMPTY_SQUAD_SPEED);
    if boosted {
        speed = SpeedFactor::BOOSTED.apply(speed);
    }

    SquadStats { attack, defense, speed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn soldier(id: u32, attack: RangeProfile, speed: i32) -> Soldier {
        Soldier::new(SoldierId(id), format!("s{id}"), fixed(20), attack, RangeProfile::from_ints(1, 1, 1, 0), fixed(speed))
    }

    fn squad_of(soldiers: &[&Soldier]) -> Squad {
        let mut squad = Squad::new(SquadId(1), "alpha");
        for s in soldiers {
            squad.add_member(s.id).expect("slot available");
        }
        squad
    }

    fn map(soldiers: &[&Soldier]) -> BTreeMap<SoldierId, Soldier> {
        soldiers.iter().map(|s| (s.id, (*s).clone())).collect()
    }

    #[test]
    fn test_empty_squad_uses_sentinel_speed() {
        let squad = Squad::new(SquadId(1), "empty");
        let stats = aggregate(&squad, &BTreeMap::new(), &RosterRules::default());
        assert_eq!(stats.speed, fixed(5));
        assert_eq!(stats.attack, RangeProfile::ZERO);
    }

    #[test]
    fn test_aggregate_sums_and_takes_min_speed() {
        let a = soldier(1, RangeProfile::from_ints(3, 2, 1, 0), 6);
        let b = soldier(2, RangeProfile::from_ints(1, 4, 0, 5), 4);
        let squad = squad_of(&[&a, &b]);

        let stats = aggregate(&squad, &map(&[&a, &b]), &RosterRules::default());
        assert_eq!(stats.attack, RangeProfile::from_ints(4, 6, 1, 5));
        assert_eq!(stats.defense, RangeProfile::from_ints(2, 2, 2, 0));
        assert_eq!(stats.speed, fixed(4));
    }

    #[test]
    fn test_friendship_and_mourning_bonuses() {
        let rules = RosterRules::default();
        let mut a = soldier(1, RangeProfile::from_ints(3, 0, 0, 0), 5);
        let mut b = soldier(2, RangeProfile::from_ints(3, 0, 0, 0), 5);
        a.friendship.insert(b.id, 3);
        b.friendship.insert(a.id, 3);
        b.mourning_days = 1;
        let squad = squad_of(&[&a, &b]);

        let (a_attack, _) = effective_profiles(&a, &squad, &rules);
        assert_eq!(a_attack, RangeProfile::from_ints(4, 1, 1, 0));

        // Friend bonus and mourning penalty cancel out
        let (b_attack, _) = effective_profiles(&b, &squad, &rules);
        assert_eq!(b_attack, RangeProfile::from_ints(3, 0, 0, 0));
    }

    #[test]
    fn test_penalty_clamps_at_zero() {
        let rules = RosterRules::default();
        let mut a = soldier(1, RangeProfile::from_ints(0, 0, 2, 0), 5);
        a.mourning_days = 2;
        let squad = squad_of(&[&a]);

        let (attack, defense) = effective_profiles(&a, &squad, &rules);
        assert_eq!(attack, RangeProfile::from_ints(0, 0, 1, 0));
        assert_eq!(defense, RangeProfile::ZERO);
    }

    #[test]
    fn test_increase_speed_boosts_squad() {
        let mut a = soldier(1, RangeProfile::ZERO, 10);
        a.capabilities = Capabilities::INCREASE_SPEED;
        let b = soldier(2, RangeProfile::ZERO, 10);
        let squad = squad_of(&[&a, &b]);

        let stats = aggregate(&squad, &map(&[&a, &b]), &RosterRules::default());
        assert_eq!(stats.speed, fixed(11));
    }

    #[test]
    fn test_preferred_range_policies() {
        let a = soldier(1, RangeProfile::from_ints(2, 5, 5, 0), 5);
        let mut squad = squad_of(&[&a]);
        squad.set_stats(aggregate(&squad, &map(&[&a]), &RosterRules::default()));

        // Middle and Long tie, nearer wins
        assert_eq!(squad.preferred_range(), RangeKind::Middle);

        squad.range_policy = RangePolicy::MaximizeDefense;
        assert_eq!(squad.preferred_range(), RangeKind::Short);

        squad.range_policy = RangePolicy::PlayerChoice;
        squad.player_range = RangeKind::Long;
        assert_eq!(squad.preferred_range(), RangeKind::Long);
        assert_eq!(squad.max_stop_range(&RangeRadii::default()), fixed(18));
    }

    #[test]
    fn test_squad_slots() {
        let mut squad = Squad::new(SquadId(1), "alpha");
        for id in 1..=4 {
            squad.add_member(SoldierId(id)).expect("slot available");
        }
        assert_eq!(squad.add_member(SoldierId(9)), Err(SiegeError::SquadFull));
        assert_eq!(squad.add_member(SoldierId(2)), Ok(1));

        assert!(squad.remove_member(SoldierId(2)));
        assert!(!squad.contains(SoldierId(2)));
        assert_eq!(squad.add_member(SoldierId(9)), Ok(1));
    }

    #[test]
    fn test_formation_offsets_are_distinct() {
        for formation in [Formation::Line, Formation::Column, Formation::Square, Formation::Wedge] {
            let offsets: Vec<_> = (0..SQUAD_SIZE).map(|slot| formation.offset(slot)).collect();
            for (i, a) in offsets.iter().enumerate() {
                for b in &offsets[i + 1..] {
                    assert_ne!(a, b, "{formation:?}");
                }
            }
        }
    }
}
