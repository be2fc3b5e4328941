//! Deployed soldiers.
//!
//! A soldier unit fights for its squad's target when it can see and
//! reach it, and otherwise picks the nearest enemy in reach as a
//! secondary target. Medics patch up squad-mates in the field.
//!
//! Wounding happens when a soldier drops to zero HP while a squad-mate is
//! still standing. It slows the soldier and its squad by 10%, at most
//! once until the soldier is healed back above zero.

use tracing::debug;

use crate::combat::{resolve_shot, Combatant, Damageable, ShotOutcome, Targeting};
use crate::components::{Capabilities, EntityId, SoldierId, SpeedFactor};
use crate::events::GameEvent;
use crate::math::{rotate_toward, Fixed, Vec2Fixed};
use crate::range::{classify, is_in_sight, nearest_of_capability};
use crate::simulation::Simulation;

/// Result of [`SoldierUnit::heal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealOutcome {
    /// HP actually restored.
    pub restored: Fixed,
    /// The soldier's wound was cleared.
    pub recovered: bool,
}

/// A soldier deployed in an attack session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SoldierUnit {
    /// Entity id.
    pub id: EntityId,
    /// Roster soldier this unit represents.
    pub soldier: SoldierId,
    /// Owning squad unit.
    pub squad: EntityId,
    /// Formation slot.
    pub slot: usize,
    /// Combat state. Its target is the one currently engaged.
    pub combatant: Combatant,
    /// Unit facing vector.
    pub facing: Vec2Fixed,
    /// Slowed by a wound.
    pub wounded: bool,
    /// Base movement speed.
    pub speed_base: Fixed,
    /// Product of active speed modifiers.
    pub speed_factor: SpeedFactor,
    /// Tagged abilities.
    pub capabilities: Capabilities,
    /// Set by construction, cleared at the end of the soldier's tick.
    pub is_building_this_tick: bool,
    /// HP removed from enemies this session.
    pub damage_dealt: Fixed,
}

impl SoldierUnit {
    /// Effective movement speed.
    #[must_use]
    pub fn speed(&self) -> Fixed {
        self.speed_factor.apply(self.speed_base)
    }

    /// Apply the wound penalty. Returns `true` if the soldier was not
    /// already wounded.
    pub fn wound(&mut self, events: &mut Vec<GameEvent>) -> bool {
        if self.wounded {
            return false;
        }
        self.wounded = true;
        self.speed_factor = self.speed_factor.times(SpeedFactor::WOUNDED);
        events.push(GameEvent::WoundedChanged {
            entity: self.id,
            wounded: true,
        });
        true
    }

    /// Restore HP. Rising above zero while wounded removes the penalty
    /// by dividing out the same factor.
    pub fn heal(&mut self, amount: Fixed, events: &mut Vec<GameEvent>) -> HealOutcome {
        let restored = self.combatant.heal(amount, events);
        let recovered = self.wounded && !self.combatant.is_down();
        if recovered {
            self.wounded = false;
            self.speed_factor = self.speed_factor.divided_by(SpeedFactor::WOUNDED);
            events.push(GameEvent::WoundedChanged {
                entity: self.id,
                wounded: false,
            });
        }
        HealOutcome { restored, recovered }
    }
}

impl Damageable for SoldierUnit {
    fn combatant(&self) -> &Combatant {
        &self.combatant
    }

    fn combatant_mut(&mut self) -> &mut Combatant {
        &mut self.combatant
    }
}

impl Targeting for SoldierUnit {
    fn current_target(&self) -> Option<EntityId> {
        self.combatant.target()
    }

    fn target_lost(&mut self, target: EntityId, events: &mut Vec<GameEvent>) {
        self.combatant.forget_target(target, events);
    }
}

impl Simulation {
    /// Soldier unit by id.
    #[must_use]
    pub fn soldier_unit(&self, id: EntityId) -> Option<&SoldierUnit> {
        self.soldier_units.get(id)
    }

    /// Wound a soldier and slow its squad. Returns `true` if newly wounded.
    pub fn wound_soldier(&mut self, id: EntityId) -> bool {
        let Some(unit) = self.soldier_units.get_mut(id) else {
            return false;
        };
        if !unit.wound(&mut self.pending) {
            return false;
        }
        let squad = unit.squad;
        debug!(soldier = id, squad, "Soldier wounded");
        if let Some(squad_unit) = self.squad_units.get_mut(squad) {
            squad_unit.speed_factor = squad_unit.speed_factor.times(SpeedFactor::WOUNDED);
        }
        self.refresh_speeds(squad);
        true
    }

    /// Heal a soldier. Clearing a wound also lifts the squad penalty.
    pub fn heal_soldier(&mut self, id: EntityId, amount: Fixed) -> HealOutcome {
        let Some(unit) = self.soldier_units.get_mut(id) else {
            return HealOutcome::default();
        };
        let outcome = unit.heal(amount, &mut self.pending);
        if outcome.recovered {
            let squad = unit.squad;
            debug!(soldier = id, squad, "Soldier recovered");
            if let Some(squad_unit) = self.squad_units.get_mut(squad) {
                squad_unit.speed_factor = squad_unit.speed_factor.divided_by(SpeedFactor::WOUNDED);
            }
            self.refresh_speeds(squad);
        }
        outcome
    }

    /// Push the squad's and its members' speeds to the mover.
    pub(crate) fn refresh_speeds(&mut self, squad: EntityId) {
        let Some(squad_unit) = self.squad_units.get(squad) else {
            return;
        };
        self.mover.set_speed(squad, squad_unit.speed());
        for member in squad_unit.members.clone() {
            if let Some(unit) = self.soldier_units.get(member) {
                self.mover.set_speed(member, unit.speed());
            }
        }
    }

    /// A soldier dropped to zero HP.
    pub(crate) fn soldier_down(&mut self, id: EntityId) {
        let Some(unit) = self.soldier_units.get_mut(id) else {
            return;
        };
        let squad = unit.squad;
        unit.combatant
            .try_set_target(None, &mut self.death_watch, &mut self.pending);
        self.mover.stop(id);

        let mate_standing = self.squad_units.get(squad).is_some_and(|s| {
            s.members
                .iter()
                .filter(|m| **m != id)
                .any(|m| self.soldier_units.get(*m).is_some_and(|u| !u.combatant.is_down()))
        });
        if mate_standing {
            self.wound_soldier(id);
        }
        self.check_death(squad);
    }

    /// Tower the soldier can engage for its squad, with its position.
    fn engageable_primary(&self, unit: &SoldierUnit, position: Vec2Fixed) -> Option<(EntityId, Vec2Fixed)> {
        let target = self.squad_units.get(unit.squad)?.target?;
        let tower = self.towers.get(target)?;
        if tower.combatant.is_down() {
            return None;
        }
        let band = classify(position, tower.position, &self.config.radii);
        let engageable =
            unit.combatant.can_attack_at(band) && !self.terrain.line_of_sight_blocked(position, tower.position);
        engageable.then_some((target, tower.position))
    }

    /// Nearest living enemy within the soldier's radii that it can hit.
    fn secondary_target(&self, unit: &SoldierUnit, position: Vec2Fixed) -> Option<EntityId> {
        let radii = self.config.radii;
        let candidates = self.enemies.sorted_ids().into_iter().filter_map(|enemy| {
            let alive = self.enemies.get(enemy).is_some_and(|e| !e.combatant.is_down());
            if !alive {
                return None;
            }
            self.mover.position(enemy).map(|p| (enemy, p))
        });
        nearest_of_capability(position, candidates, radii.long, |enemy| {
            self.mover.position(*enemy).is_some_and(|p| {
                unit.combatant.can_attack_at(classify(position, p, &radii))
                    && !self.terrain.line_of_sight_blocked(position, p)
            })
        })
    }

    /// Most injured squad-mate within short range, wounded first.
    fn field_patient(&self, medic: &SoldierUnit, position: Vec2Fixed) -> Option<EntityId> {
        let squad = self.squad_units.get(medic.squad)?;
        let reach_sq = self.config.radii.short * self.config.radii.short;
        let mut best: Option<(bool, Fixed, EntityId)> = None;

        for &member in &squad.members {
            if member == medic.id {
                continue;
            }
            let Some(patient) = self.soldier_units.get(member) else {
                continue;
            };
            let missing = patient.combatant.health.missing();
            if missing <= Fixed::ZERO {
                continue;
            }
            let in_reach = self
                .mover
                .position(member)
                .is_some_and(|p| p.distance_squared(position) <= reach_sq);
            if !in_reach {
                continue;
            }
            let better = best.map_or(true, |(wounded, worst, _)| {
                (patient.wounded, missing) > (wounded, worst)
            });
            if better {
                best = Some((patient.wounded, missing, member));
            }
        }
        best.map(|(_, _, id)| id)
    }

    /// Advance every soldier unit.
    pub(crate) fn run_soldier_system(&mut self, dt: Fixed) {
        for id in self.soldier_units.sorted_ids() {
            self.tick_soldier(id, dt);
        }
    }

    fn tick_soldier(&mut self, id: EntityId, dt: Fixed) {
        let Some(unit) = self.soldier_units.get_mut(id) else {
            return;
        };
        unit.combatant.tick(dt);
        if unit.combatant.is_down() {
            unit.is_building_this_tick = false;
            return;
        }
        let Some(position) = self.mover.position(id) else {
            unit.is_building_this_tick = false;
            return;
        };
        let snapshot = unit.clone();

        if snapshot.capabilities.contains(Capabilities::HEAL) && !snapshot.wounded {
            if let Some(patient) = self.field_patient(&snapshot, position) {
                let amount = self.config.field_heal_rate * dt;
                self.heal_soldier(patient, amount);
            }
        }

        let engaged = match self.engageable_primary(&snapshot, position) {
            Some(primary) => Some(primary),
            None => self
                .secondary_target(&snapshot, position)
                .and_then(|enemy| self.mover.position(enemy).map(|p| (enemy, p))),
        };

        let radii = self.config.radii;
        let cone = self.config.sight_cone();
        let turn_step = self.config.soldier_turn_step(dt);
        let velocity = self.mover.velocity(id);

        let Some(unit) = self.soldier_units.get_mut(id) else {
            return;
        };
        unit.combatant
            .try_set_target(engaged.map(|(t, _)| t), &mut self.death_watch, &mut self.pending);

        let mut hit = None;
        match engaged {
            Some((target, target_pos)) => {
                unit.facing = rotate_toward(unit.facing, target_pos - position, turn_step);
                let can_fire = is_in_sight(position, target_pos, unit.facing, &cone)
                    && !unit.wounded
                    && !unit.is_building_this_tick;
                if can_fire {
                    if let ShotOutcome::Hit { kind, amount } =
                        resolve_shot(&mut unit.combatant, classify(position, target_pos, &radii))
                    {
                        hit = Some((target, kind, amount));
                    }
                }
            }
            None => {
                if !velocity.is_zero() {
                    unit.facing = rotate_toward(unit.facing, velocity, turn_step);
                }
            }
        }
        unit.is_building_this_tick = false;

        if let Some((target, kind, amount)) = hit {
            let outcome = self.deliver_hit(id, target, kind, amount);
            if let Some(unit) = self.soldier_units.get_mut(id) {
                unit.damage_dealt += outcome.dealt;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::DefenseModel;
    use crate::components::{Health, RangeKind, RangeProfile};
    use crate::events::Channel;
    use crate::testing::{at, deployed, fixed, hostile, members, soldier, vec2};

    fn unit() -> SoldierUnit {
        SoldierUnit {
            id: 5,
            soldier: SoldierId(1),
            squad: 1,
            slot: 0,
            combatant: Combatant::new(5, Health::new(fixed(20)), RangeProfile::ZERO, RangeProfile::ZERO, fixed(1)),
            facing: Vec2Fixed::FORWARD,
            wounded: false,
            speed_base: fixed(10),
            speed_factor: SpeedFactor::ONE,
            capabilities: Capabilities::empty(),
            is_building_this_tick: false,
            damage_dealt: Fixed::ZERO,
        }
    }

    #[test]
    fn test_wound_is_idempotent() {
        let mut soldier = unit();
        let mut events = Vec::new();

        assert!(soldier.wound(&mut events));
        assert!(!soldier.wound(&mut events));

        assert_eq!(soldier.speed_factor, SpeedFactor::WOUNDED);
        assert_eq!(soldier.speed(), fixed(9));
        assert_eq!(events.iter().filter(|e| e.channel() == Channel::WoundedChanged).count(), 1);
    }

    #[test]
    fn test_heal_restores_exact_speed() {
        let mut soldier = unit();
        let mut events = Vec::new();
        soldier
            .combatant
            .apply_damage(fixed(20), RangeKind::Short, DefenseModel::MatchingRange, &mut events);
        soldier.wound(&mut events);

        let outcome = soldier.heal(fixed(5), &mut events);
        assert!(outcome.recovered);
        assert_eq!(outcome.restored, fixed(5));
        assert!(!soldier.wounded);
        assert_eq!(soldier.speed_factor, SpeedFactor::ONE);
        assert_eq!(soldier.speed(), fixed(10));
    }

    #[test]
    fn test_heal_without_wound_keeps_speed() {
        let mut soldier = unit();
        let mut events = Vec::new();
        soldier
            .combatant
            .apply_damage(fixed(5), RangeKind::Short, DefenseModel::MatchingRange, &mut events);

        let outcome = soldier.heal(fixed(2), &mut events);
        assert!(!outcome.recovered);
        assert_eq!(soldier.speed_factor, SpeedFactor::ONE);
    }

    fn enemy_hp(sim: &Simulation, enemy: EntityId) -> Fixed {
        sim.enemy(enemy).map_or(Fixed::ZERO, |e| e.combatant.health.current)
    }

    /// A two-soldier squad and a passive enemy at `offset` from the first soldier.
    fn skirmish(offset: Vec2Fixed) -> (Simulation, EntityId, EntityId) {
        let (mut sim, squad) = deployed(vec![soldier(1, 40), soldier(2, 40)]);
        let shooter = members(&sim, squad)[0];
        let enemy = sim.add_enemy(at(&sim, shooter) + offset, hostile(20, RangeProfile::ZERO));
        (sim, shooter, enemy)
    }

    #[test]
    fn test_soldier_fires_at_nearest_enemy() {
        let (mut sim, shooter, near) = skirmish(vec2(0, 4));
        let far = sim.add_enemy(at(&sim, shooter) + vec2(0, 10), hostile(20, RangeProfile::ZERO));

        sim.tick_soldier(shooter, Fixed::from_num(0.1));
        assert_eq!(sim.target_of(shooter), Some(near));
        assert_eq!(enemy_hp(&sim, near), fixed(12));
        assert_eq!(enemy_hp(&sim, far), fixed(20));

        let unit = sim.soldier_unit(shooter).expect("soldier");
        assert_eq!(unit.damage_dealt, fixed(8));
        assert_eq!(unit.combatant.shooting_delay, Fixed::ONE);
    }

    #[test]
    fn test_wounded_soldier_holds_fire() {
        let (mut sim, shooter, enemy) = skirmish(vec2(0, 4));
        sim.soldier_units.get_mut(shooter).expect("soldier").wounded = true;

        sim.tick_soldier(shooter, Fixed::from_num(0.1));
        assert_eq!(sim.target_of(shooter), Some(enemy));
        assert_eq!(enemy_hp(&sim, enemy), fixed(20));
    }

    #[test]
    fn test_building_soldier_holds_fire_for_one_tick() {
        let (mut sim, shooter, enemy) = skirmish(vec2(0, 4));
        sim.soldier_units.get_mut(shooter).expect("soldier").is_building_this_tick = true;

        sim.tick_soldier(shooter, Fixed::from_num(0.1));
        assert_eq!(enemy_hp(&sim, enemy), fixed(20));
        assert!(!sim.soldier_unit(shooter).expect("soldier").is_building_this_tick);

        sim.tick_soldier(shooter, Fixed::from_num(0.1));
        assert_eq!(enemy_hp(&sim, enemy), fixed(12));
    }

    #[test]
    fn test_soldier_turns_before_firing_behind() {
        let (mut sim, shooter, enemy) = skirmish(vec2(0, -4));
        let dt = Fixed::from_num(0.1);

        sim.tick_soldier(shooter, dt);
        assert_eq!(sim.target_of(shooter), Some(enemy));
        assert_eq!(enemy_hp(&sim, enemy), fixed(20));

        for _ in 0..10 {
            sim.tick_soldier(shooter, dt);
        }
        assert_eq!(enemy_hp(&sim, enemy), fixed(12));
    }

    #[test]
    fn test_squad_target_beats_secondary_enemy() {
        let (mut sim, shooter, enemy) = skirmish(vec2(0, 4));
        let squad = sim.soldier_unit(shooter).expect("soldier").squad;
        let tower = sim.add_tower(at(&sim, shooter) + vec2(0, 8), hostile(30, RangeProfile::ZERO), None);
        sim.set_squad_target(squad, Some(tower));

        sim.tick_soldier(shooter, Fixed::from_num(0.1));
        assert_eq!(sim.target_of(shooter), Some(tower));
        assert_eq!(enemy_hp(&sim, enemy), fixed(20));
        assert_eq!(sim.tower(tower).map(|t| t.combatant.health.current), Some(fixed(24)));
    }

    #[test]
    fn test_medic_heals_most_injured_mate() {
        let mut medic = soldier(1, 40);
        medic.capabilities = Capabilities::HEAL;
        let (mut sim, squad) = deployed(vec![medic, soldier(2, 40), soldier(3, 40)]);
        let ids = members(&sim, squad);
        sim.soldier_units.get_mut(ids[1]).expect("soldier").combatant.health.current = fixed(30);
        sim.soldier_units.get_mut(ids[2]).expect("soldier").combatant.health.current = fixed(20);

        sim.tick_soldier(ids[0], Fixed::ONE);
        let hp = |sim: &Simulation, id| sim.soldier_unit(id).map(|u| u.combatant.health.current);
        assert_eq!(hp(&sim, ids[1]), Some(fixed(30)));
        assert_eq!(hp(&sim, ids[2]), Some(fixed(24)));

        // A wounded medic tends nobody
        sim.soldier_units.get_mut(ids[0]).expect("medic").wounded = true;
        sim.tick_soldier(ids[0], Fixed::ONE);
        assert_eq!(hp(&sim, ids[2]), Some(fixed(24)));
    }

    #[test]
    fn test_medic_treats_wounded_first() {
        let mut medic = soldier(1, 40);
        medic.capabilities = Capabilities::HEAL;
        let (mut sim, squad) = deployed(vec![medic, soldier(2, 60), soldier(3, 40)]);
        let ids = members(&sim, squad);
        // Missing more HP than the wounded mate
        sim.soldier_units.get_mut(ids[1]).expect("soldier").combatant.health.current = fixed(10);
        sim.damage_entity(ids[2], fixed(40), RangeKind::Short);
        assert!(sim.soldier_unit(ids[2]).expect("soldier").wounded);

        sim.tick_soldier(ids[0], Fixed::ONE);
        let patient = sim.soldier_unit(ids[2]).expect("soldier");
        assert_eq!(patient.combatant.health.current, fixed(4));
        assert!(!patient.wounded);
        assert_eq!(sim.squad_unit(squad).map(|u| u.speed_factor), Some(SpeedFactor::ONE));
        assert_eq!(
            sim.soldier_unit(ids[1]).map(|u| u.combatant.health.current),
            Some(fixed(10))
        );
    }

    #[test]
    fn test_soldier_down_wounds_while_a_mate_stands() {
        let (mut sim, squad) = deployed(vec![soldier(1, 40), soldier(2, 40)]);
        let ids = members(&sim, squad);
        sim.mover.set_destination(ids[0], vec2(30, 30));

        sim.damage_entity(ids[0], fixed(40), RangeKind::Short);
        let unit = sim.soldier_unit(ids[0]).expect("soldier stays deployed");
        assert!(unit.wounded);
        assert!(sim.mover.is_stopped(ids[0]));
        let squad_unit = sim.squad_unit(squad).expect("squad survives");
        assert_eq!(squad_unit.speed_factor, SpeedFactor::WOUNDED);
        assert!(!squad_unit.state.is_terminal());
    }

    #[test]
    fn test_last_soldier_down_is_not_wounded() {
        let (mut sim, squad) = deployed(vec![soldier(1, 40), soldier(2, 40)]);
        let ids = members(&sim, squad);

        sim.damage_entity(ids[1], fixed(40), RangeKind::Short);
        sim.damage_entity(ids[0], fixed(40), RangeKind::Short);

        let wounded: Vec<EntityId> = sim
            .pending
            .iter()
            .filter_map(|e| match e {
                GameEvent::WoundedChanged { entity, wounded: true } => Some(*entity),
                _ => None,
            })
            .collect();
        assert_eq!(wounded, vec![ids[1]]);
        assert!(sim.squad_unit(squad).is_none());
        assert_eq!(sim.pending.iter().filter(|e| e.channel() == Channel::UnitDestroyed).count(), 1);
    }
}
