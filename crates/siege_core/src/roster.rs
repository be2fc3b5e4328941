//! Persistent soldiers and the roster that survives between sessions.
//!
//! The roster owns every [`Soldier`] and [`Squad`]. Sessions borrow
//! squads when they deploy and write HP, experience, friendship and
//! deaths back when units return or fall. [`Roster::end_day`] resolves
//! resting, dying and mourning between days.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::components::{Capabilities, EntityId, RangeKind, RangeProfile, SoldierId, SquadId};
use crate::data::RosterRules;
use crate::error::{Result, SiegeError};
use crate::math::{decimal_serde, Fixed};
use crate::squad::{aggregate, effective_profiles, Squad};

/// Soldier type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SoldierClass {
    /// General infantry.
    #[default]
    Rifleman,
    /// Long-range specialist.
    Sniper,
    /// Builds turrets and headquarters.
    Engineer,
    /// Field healer.
    Medic,
    /// Demolitions.
    Sapper,
}

impl SoldierClass {
    /// Seconds between shots.
    #[must_use]
    pub fn shooting_period(self) -> Fixed {
        match self {
            SoldierClass::Rifleman | SoldierClass::Engineer | SoldierClass::Medic => Fixed::ONE,
            SoldierClass::Sniper => Fixed::from_num(2),
            SoldierClass::Sapper => Fixed::from_num(3) / Fixed::from_num(2),
        }
    }
}

/// A persistent roster soldier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Soldier {
    /// Persistent identifier.
    pub id: SoldierId,
    /// Display name.
    pub name: String,
    /// Portrait asset key.
    #[serde(default)]
    pub portrait: String,
    /// Soldier type.
    #[serde(default)]
    pub class: SoldierClass,
    /// Experience level, starting at 1.
    #[serde(default = "first_level")]
    pub level: u32,
    /// Accumulated experience.
    #[serde(default)]
    pub xp: u32,
    /// Maximum HP.
    #[serde(with = "decimal_serde")]
    pub max_hp: Fixed,
    /// HP carried between sessions.
    #[serde(with = "decimal_serde")]
    pub current_hp: Fixed,
    /// Base attack per range.
    #[serde(default)]
    pub attack: RangeProfile,
    /// Base defense per range.
    #[serde(default)]
    pub defense: RangeProfile,
    /// Base movement speed.
    #[serde(with = "decimal_serde")]
    pub speed: Fixed,
    /// Tagged abilities.
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Friendship points by other soldier.
    #[serde(default)]
    pub friendship: BTreeMap<SoldierId, u32>,
    /// Day the soldier died, 0 while alive.
    #[serde(default)]
    pub day_of_death: u32,
    /// Days of mourning left.
    #[serde(default)]
    pub mourning_days: u32,
    /// Currently deployed in a session.
    #[serde(default)]
    pub engaged: bool,
}

const fn first_level() -> u32 {
    1
}

impl Soldier {
    /// Create a healthy level 1 soldier.
    #[must_use]
    pub fn new(
        id: SoldierId,
        name: impl Into<String>,
        max_hp: Fixed,
        attack: RangeProfile,
        defense: RangeProfile,
        speed: Fixed,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            portrait: String::new(),
            class: SoldierClass::default(),
            level: 1,
            xp: 0,
            max_hp,
            current_hp: max_hp,
            attack,
            defense,
            speed,
            capabilities: Capabilities::empty(),
            friendship: BTreeMap::new(),
            day_of_death: 0,
            mourning_days: 0,
            engaged: false,
        }
    }

    /// Check whether the soldier has not died.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.day_of_death == 0
    }

    /// Friendship points toward another soldier.
    #[must_use]
    pub fn friendship_with(&self, other: SoldierId) -> u32 {
        self.friendship.get(&other).copied().unwrap_or(0)
    }

    /// Add experience and apply any level-ups. Returns levels gained.
    pub fn grant_xp(&mut self, xp: u32, rules: &RosterRules) -> u32 {
        self.xp = self.xp.saturating_add(xp);
        if rules.xp_per_level == 0 {
            return 0;
        }
        let target_level = 1 + self.xp / rules.xp_per_level;
        let gained = target_level.saturating_sub(self.level);
        if gained == 0 {
            return 0;
        }

        let step = Fixed::from_num(gained);
        for kind in RangeKind::DISTANCES {
            let value = self.attack.get_mut(kind);
            if *value > Fixed::ZERO {
                *value += step;
            }
        }
        if self.attack.explosive > Fixed::ZERO {
            self.attack.explosive += step;
        }
        self.max_hp += rules.level_hp_bonus * step;
        self.level = target_level;
        gained
    }
}

/// Live state of a soldier coming back from a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnedSoldier {
    /// Roster soldier.
    pub soldier: SoldierId,
    /// HP at the moment of return.
    pub hp: Fixed,
    /// Damage dealt during the session.
    pub damage_dealt: Fixed,
}

/// What happened during [`Roster::end_day`] and the session's day end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DayReport {
    /// Day that just ended.
    pub day: u32,
    /// Soldiers who died of their wounds.
    pub deaths: Vec<SoldierId>,
    /// Soldiers saved from death at 1 HP.
    pub saved: Vec<SoldierId>,
    /// Soldiers who regained HP by resting.
    pub rested: Vec<SoldierId>,
    /// Soldiers who finished mourning.
    pub mourning_ended: Vec<SoldierId>,
    /// Everyone who died since the last report, for display.
    pub mourned: Vec<SoldierId>,
    /// Explosive charges detonated at day end.
    pub detonated: Vec<EntityId>,
    /// Turrets whose service ended.
    pub expired_turrets: Vec<EntityId>,
}

/// All persistent soldiers and squads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    day: u32,
    soldiers: BTreeMap<SoldierId, Soldier>,
    squads: BTreeMap<SquadId, Squad>,
    #[serde(default)]
    mourning_queue: Vec<SoldierId>,
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

impl Roster {
    /// Create an empty roster on day 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            day: 1,
            soldiers: BTreeMap::new(),
            squads: BTreeMap::new(),
            mourning_queue: Vec::new(),
        }
    }

    /// Current day, starting at 1.
    #[must_use]
    pub const fn day(&self) -> u32 {
        self.day
    }

    /// Add or replace a soldier.
    pub fn add_soldier(&mut self, soldier: Soldier) {
        self.soldiers.insert(soldier.id, soldier);
    }

    /// Add or replace a squad. Unknown members are dropped from its slots.
    pub fn add_squad(&mut self, mut squad: Squad, rules: &RosterRules) {
        for slot in &mut squad.slots {
            if slot.is_some_and(|id| !self.soldiers.contains_key(&id)) {
                *slot = None;
            }
        }
        let id = squad.id;
        self.squads.insert(id, squad);
        self.recompute(id, rules);
    }

    /// Look up a soldier.
    #[must_use]
    pub fn soldier(&self, id: SoldierId) -> Option<&Soldier> {
        self.soldiers.get(&id)
    }

    /// Look up a soldier mutably.
    pub fn soldier_mut(&mut self, id: SoldierId) -> Option<&mut Soldier> {
        self.soldiers.get_mut(&id)
    }

    /// Look up a squad.
    #[must_use]
    pub fn squad(&self, id: SquadId) -> Option<&Squad> {
        self.squads.get(&id)
    }

    /// Every soldier in id order.
    pub fn soldiers(&self) -> impl Iterator<Item = &Soldier> {
        self.soldiers.values()
    }

    /// Every squad in id order.
    pub fn squads(&self) -> impl Iterator<Item = &Squad> {
        self.squads.values()
    }

    /// Squad a soldier belongs to.
    #[must_use]
    pub fn squad_of(&self, soldier: SoldierId) -> Option<SquadId> {
        self.squads
            .values()
            .find(|squad| squad.contains(soldier))
            .map(|squad| squad.id)
    }

    /// Move a soldier into a squad, leaving any previous one.
    pub fn assign(&mut self, soldier: SoldierId, squad: SquadId, rules: &RosterRules) -> Result<usize> {
        let alive = self
            .soldiers
            .get(&soldier)
            .ok_or(SiegeError::UnknownSoldier(soldier.0))?
            .is_alive();
        if !alive {
            return Err(SiegeError::UnknownSoldier(soldier.0));
        }
        if !self.squads.contains_key(&squad) {
            return Err(SiegeError::UnknownSquad(squad.0));
        }
        if let Some(previous) = self.squad_of(soldier).filter(|p| *p != squad) {
            if let Some(prev) = self.squads.get_mut(&previous) {
                prev.remove_member(soldier);
            }
            self.recompute(previous, rules);
        }
        let slot = self
            .squads
            .get_mut(&squad)
            .ok_or(SiegeError::UnknownSquad(squad.0))?
            .add_member(soldier)?;
        self.recompute(squad, rules);
        Ok(slot)
    }

    /// Take a soldier out of its squad.
    pub fn unassign(&mut self, soldier: SoldierId, rules: &RosterRules) -> Result<()> {
        let squad = self.squad_of(soldier).ok_or(SiegeError::UnknownSoldier(soldier.0))?;
        if let Some(s) = self.squads.get_mut(&squad) {
            s.remove_member(soldier);
        }
        self.recompute(squad, rules);
        Ok(())
    }

    /// Mark a squad for deployment in the next session.
    pub fn set_engaged(&mut self, squad: SquadId, engaged: bool) -> Result<()> {
        let s = self.squads.get_mut(&squad).ok_or(SiegeError::UnknownSquad(squad.0))?;
        s.engaged = engaged;
        Ok(())
    }

    /// Flag soldiers as deployed in the running session.
    ///
    /// Deployed soldiers skip the day's rest until they come back.
    pub fn mark_deployed(&mut self, soldiers: &[SoldierId]) {
        for id in soldiers {
            if let Some(soldier) = self.soldiers.get_mut(id) {
                soldier.engaged = true;
            }
        }
    }

    /// Engaged squads with at least one living member, in id order.
    #[must_use]
    pub fn engaged_squads(&self) -> Vec<SquadId> {
        self.squads
            .values()
            .filter(|squad| squad.engaged)
            .filter(|squad| {
                squad
                    .members()
                    .any(|(_, id)| self.soldiers.get(&id).is_some_and(Soldier::is_alive))
            })
            .map(|squad| squad.id)
            .collect()
    }

    /// Refresh a squad's cached stats.
    pub fn recompute(&mut self, squad: SquadId, rules: &RosterRules) {
        if let Some(s) = self.squads.get(&squad) {
            let stats = aggregate(s, &self.soldiers, rules);
            if let Some(s) = self.squads.get_mut(&squad) {
                s.set_stats(stats);
            }
        }
    }

    fn recompute_all(&mut self, rules: &RosterRules) {
        let ids: Vec<SquadId> = self.squads.keys().copied().collect();
        for id in ids {
            self.recompute(id, rules);
        }
    }

    /// Attack and defense of a squad member with bonuses applied.
    pub fn effective_profiles(&self, soldier: SoldierId, rules: &RosterRules) -> Result<(RangeProfile, RangeProfile)> {
        let s = self.soldiers.get(&soldier).ok_or(SiegeError::UnknownSoldier(soldier.0))?;
        let squad = self
            .squad_of(soldier)
            .and_then(|id| self.squads.get(&id))
            .ok_or(SiegeError::UnknownSoldier(soldier.0))?;
        Ok(effective_profiles(s, squad, rules))
    }

    /// Soldiers queued for the end-of-day mourning display.
    #[must_use]
    pub fn mourning_queue(&self) -> &[SoldierId] {
        &self.mourning_queue
    }

    /// Record a death: stamp the day, queue it for mourning, vacate the
    /// slot and put the soldier's friends in mourning.
    pub fn record_death(&mut self, soldier: SoldierId, rules: &RosterRules) {
        let day = self.day;
        let Some(dead) = self.soldiers.get_mut(&soldier) else {
            return;
        };
        if !dead.is_alive() {
            return;
        }
        dead.day_of_death = day;
        dead.current_hp = Fixed::ZERO;
        dead.engaged = false;
        self.mourning_queue.push(soldier);
        info!(%soldier, day, "Soldier died");

        let mourners: Vec<SoldierId> = self
            .soldiers
            .values()
            .filter(|s| s.is_alive() && s.friendship_with(soldier) >= rules.friendship_threshold)
            .map(|s| s.id)
            .collect();
        for id in mourners {
            if let Some(mourner) = self.soldiers.get_mut(&id) {
                mourner.mourning_days = mourner.mourning_days.max(rules.mourning_days);
            }
        }

        if let Some(squad) = self.squad_of(soldier) {
            if let Some(s) = self.squads.get_mut(&squad) {
                s.remove_member(soldier);
            }
        }
        self.recompute_all(rules);
    }

    /// Write a returning squad's live state back into the roster.
    ///
    /// Copies HP, grants experience for damage dealt and adds a
    /// friendship point between every pair that returned together.
    pub fn return_from_session(&mut self, squad: SquadId, returned: &[ReturnedSoldier], rules: &RosterRules) {
        for r in returned {
            if let Some(soldier) = self.soldiers.get_mut(&r.soldier) {
                soldier.current_hp = r.hp.max(Fixed::ZERO).min(soldier.max_hp);
                soldier.engaged = false;
                let xp = r.damage_dealt.max(Fixed::ZERO).to_num::<u32>();
                let levels = soldier.grant_xp(xp, rules);
                if levels > 0 {
                    debug!(soldier = %soldier.id, level = soldier.level, "Soldier levelled up");
                }
            }
        }

        for (i, a) in returned.iter().enumerate() {
            for b in &returned[i + 1..] {
                if let Some(s) = self.soldiers.get_mut(&a.soldier) {
                    *s.friendship.entry(b.soldier).or_insert(0) += 1;
                }
                if let Some(s) = self.soldiers.get_mut(&b.soldier) {
                    *s.friendship.entry(a.soldier).or_insert(0) += 1;
                }
            }
        }

        if let Some(s) = self.squads.get_mut(&squad) {
            s.engaged = false;
        }
        self.recompute_all(rules);
    }

    /// Check whether a living squad-mate of `soldier` has a capability.
    fn squad_mate_has(&self, soldier: SoldierId, capability: Capabilities) -> bool {
        let Some(squad) = self.squad_of(soldier).and_then(|id| self.squads.get(&id)) else {
            return false;
        };
        squad
            .members()
            .filter(|(_, id)| *id != soldier)
            .filter_map(|(_, id)| self.soldiers.get(&id))
            .any(|mate| mate.is_alive() && mate.current_hp > Fixed::ZERO && mate.capabilities.contains(capability))
    }

    /// Resolve the day: deaths, rest, mourning. Advances the day counter.
    pub fn end_day(&mut self, rules: &RosterRules) -> DayReport {
        let mut report = DayReport {
            day: self.day,
            ..DayReport::default()
        };

        let downed: Vec<SoldierId> = self
            .soldiers
            .values()
            .filter(|s| s.is_alive() && s.current_hp <= Fixed::ZERO)
            .map(|s| s.id)
            .collect();
        for id in downed {
            if self.squad_mate_has(id, Capabilities::WOUNDED_SAVING) {
                if let Some(s) = self.soldiers.get_mut(&id) {
                    s.current_hp = Fixed::ONE.min(s.max_hp);
                }
                report.saved.push(id);
            } else {
                self.record_death(id, rules);
                report.deaths.push(id);
            }
        }

        let resting: Vec<SoldierId> = self
            .soldiers
            .values()
            .filter(|s| s.is_alive() && !s.engaged)
            .map(|s| s.id)
            .collect();
        for id in resting {
            let doubled = self.squad_mate_has(id, Capabilities::HEAL);
            if let Some(s) = self.soldiers.get_mut(&id) {
                let mut percent = rules.rest_heal_percent;
                if doubled {
                    percent *= 2;
                }
                let amount = s.max_hp * Fixed::from_num(percent) / Fixed::from_num(100);
                let before = s.current_hp;
                s.current_hp = (s.current_hp + amount).min(s.max_hp);
                if s.current_hp > before {
                    report.rested.push(id);
                }
            }
        }

        for s in self.soldiers.values_mut().filter(|s| s.is_alive()) {
            if s.mourning_days > 0 {
                s.mourning_days -= 1;
                if s.mourning_days == 0 {
                    report.mourning_ended.push(s.id);
                }
            }
        }

        report.mourned = std::mem::take(&mut self.mourning_queue);
        self.day += 1;
        self.recompute_all(rules);
        info!(day = report.day, deaths = report.deaths.len(), "Day resolved");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn soldier(id: u32, hp: i32) -> Soldier {
        Soldier::new(
            SoldierId(id),
            format!("s{id}"),
            fixed(hp),
            RangeProfile::from_ints(4, 3, 0, 0),
            RangeProfile::from_ints(1, 1, 1, 0),
            fixed(5),
        )
    }

    fn roster_with_squad(soldiers: Vec<Soldier>) -> Roster {
        let rules = RosterRules::default();
        let mut roster = Roster::new();
        let mut squad = Squad::new(SquadId(1), "alpha");
        for s in soldiers {
            squad.add_member(s.id).expect("slot available");
            roster.add_soldier(s);
        }
        roster.add_squad(squad, &rules);
        roster
    }

    #[test]
    fn test_level_up_raises_nonzero_attacks() {
        let rules = RosterRules::default();
        let mut s = soldier(1, 20);
        assert_eq!(s.grant_xp(99, &rules), 0);
        assert_eq!(s.grant_xp(1, &rules), 1);

        assert_eq!(s.level, 2);
        assert_eq!(s.attack, RangeProfile::from_ints(5, 4, 0, 0));
        assert_eq!(s.max_hp, fixed(25));
    }

    #[test]
    fn test_record_death_stamps_day_and_starts_mourning() {
        let rules = RosterRules::default();
        let mut a = soldier(1, 20);
        let b = soldier(2, 20);
        a.friendship.insert(b.id, 3);
        let mut roster = roster_with_squad(vec![a, b]);

        roster.record_death(SoldierId(2), &rules);
        // Second call is ignored
        roster.record_death(SoldierId(2), &rules);

        assert_eq!(roster.soldier(SoldierId(2)).map(|s| s.day_of_death), Some(1));
        assert_eq!(roster.mourning_queue(), &[SoldierId(2)]);
        assert_eq!(roster.soldier(SoldierId(1)).map(|s| s.mourning_days), Some(2));
        assert_eq!(roster.squad(SquadId(1)).map(Squad::member_count), Some(1));
    }

    #[test]
    fn test_return_from_session_writes_back() {
        let rules = RosterRules::default();
        let mut roster = roster_with_squad(vec![soldier(1, 20), soldier(2, 20)]);
        roster.set_engaged(SquadId(1), true).expect("squad exists");

        roster.return_from_session(
            SquadId(1),
            &[
                ReturnedSoldier {
                    soldier: SoldierId(1),
                    hp: fixed(7),
                    damage_dealt: fixed(150),
                },
                ReturnedSoldier {
                    soldier: SoldierId(2),
                    hp: fixed(20),
                    damage_dealt: Fixed::ZERO,
                },
            ],
            &rules,
        );

        let a = roster.soldier(SoldierId(1)).expect("soldier exists");
        assert_eq!(a.current_hp, fixed(7));
        assert_eq!(a.xp, 150);
        assert_eq!(a.level, 2);
        assert_eq!(a.friendship_with(SoldierId(2)), 1);
        assert!(!roster.squad(SquadId(1)).expect("squad exists").engaged);
    }

    #[test]
    fn test_end_day_kills_unsaved_and_saves_with_capability() {
        let rules = RosterRules::default();
        let mut downed = soldier(1, 20);
        downed.current_hp = Fixed::ZERO;
        let mut roster = roster_with_squad(vec![downed, soldier(2, 20)]);

        let report = roster.end_day(&rules);
        assert_eq!(report.deaths, vec![SoldierId(1)]);
        assert_eq!(report.mourned, vec![SoldierId(1)]);
        assert_eq!(roster.day(), 2);

        let mut downed = soldier(3, 20);
        downed.current_hp = Fixed::ZERO;
        let mut saver = soldier(4, 20);
        saver.capabilities = Capabilities::WOUNDED_SAVING;
        let mut roster = roster_with_squad(vec![downed, saver]);

        let report = roster.end_day(&rules);
        assert_eq!(report.saved, vec![SoldierId(3)]);
        assert!(report.deaths.is_empty());
        // Saved at 1 HP, then rested 25% of 20
        assert_eq!(roster.soldier(SoldierId(3)).map(|s| s.current_hp), Some(fixed(6)));
    }

    #[test]
    fn test_rest_heal_doubles_with_medic() {
        let rules = RosterRules::default();
        let mut hurt = soldier(1, 40);
        hurt.current_hp = fixed(10);
        let mut medic = soldier(2, 40);
        medic.capabilities = Capabilities::HEAL;
        let mut roster = roster_with_squad(vec![hurt, medic]);

        roster.end_day(&rules);
        assert_eq!(roster.soldier(SoldierId(1)).map(|s| s.current_hp), Some(fixed(30)));
    }

    #[test]
    fn test_deployed_soldier_skips_rest() {
        let rules = RosterRules::default();
        let mut away = soldier(1, 40);
        away.current_hp = fixed(10);
        let mut home = soldier(2, 40);
        home.current_hp = fixed(10);
        let mut roster = roster_with_squad(vec![away, home]);

        roster.mark_deployed(&[SoldierId(1)]);
        let report = roster.end_day(&rules);
        assert_eq!(report.rested, vec![SoldierId(2)]);
        assert_eq!(roster.soldier(SoldierId(1)).map(|s| s.current_hp), Some(fixed(10)));

        let back = ReturnedSoldier {
            soldier: SoldierId(1),
            hp: fixed(10),
            damage_dealt: Fixed::ZERO,
        };
        roster.return_from_session(SquadId(1), &[back], &rules);
        assert!(!roster.soldier(SoldierId(1)).expect("soldier exists").engaged);
        let report = roster.end_day(&rules);
        assert!(report.rested.contains(&SoldierId(1)));
    }

    #[test]
    fn test_mourning_counts_down() {
        let rules = RosterRules::default();
        let mut a = soldier(1, 20);
        a.mourning_days = 1;
        let mut roster = roster_with_squad(vec![a]);

        let report = roster.end_day(&rules);
        assert_eq!(report.mourning_ended, vec![SoldierId(1)]);
    }

    #[test]
    fn test_assign_moves_between_squads() {
        let rules = RosterRules::default();
        let mut roster = roster_with_squad(vec![soldier(1, 20)]);
        roster.add_squad(Squad::new(SquadId(2), "bravo"), &rules);

        roster.assign(SoldierId(1), SquadId(2), &rules).expect("assign works");
        assert_eq!(roster.squad_of(SoldierId(1)), Some(SquadId(2)));
        assert_eq!(roster.squad(SquadId(1)).map(Squad::member_count), Some(0));

        assert_eq!(
            roster.assign(SoldierId(9), SquadId(2), &rules),
            Err(SiegeError::UnknownSoldier(9))
        );
        assert_eq!(
            roster.assign(SoldierId(1), SquadId(7), &rules),
            Err(SiegeError::UnknownSquad(7))
        );
    }

    #[test]
    fn test_unassign_frees_the_slot() {
        let rules = RosterRules::default();
        let mut roster = roster_with_squad(vec![soldier(1, 20), soldier(2, 20)]);

        roster.unassign(SoldierId(1), &rules).expect("soldier is assigned");
        assert_eq!(roster.squad_of(SoldierId(1)), None);
        assert_eq!(roster.squad(SquadId(1)).map(Squad::member_count), Some(1));
        assert_eq!(
            roster.unassign(SoldierId(1), &rules),
            Err(SiegeError::UnknownSoldier(1))
        );
    }

    #[test]
    fn test_engaged_squads_skip_dead_or_idle() {
        let rules = RosterRules::default();
        let mut roster = roster_with_squad(vec![soldier(1, 20)]);
        assert!(roster.engaged_squads().is_empty());

        roster.set_engaged(SquadId(1), true).expect("squad exists");
        assert_eq!(roster.engaged_squads(), vec![SquadId(1)]);

        roster.record_death(SoldierId(1), &rules);
        assert!(roster.engaged_squads().is_empty());
    }
}
