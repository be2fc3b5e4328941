//! Player turrets built from turret bases.

use tracing::{debug, info};

use crate::combat::{resolve_shot, Combatant, Damageable, ShotOutcome, Targeting};
use crate::components::{EntityId, Health};
use crate::events::GameEvent;
use crate::math::{rotate_toward, Fixed, Vec2Fixed};
use crate::range::{classify, is_in_sight, nearest_of_capability};
use crate::simulation::Simulation;

/// A stationary player turret.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Turret {
    /// Entity id.
    pub id: EntityId,
    /// World position.
    pub position: Vec2Fixed,
    /// Combat state.
    pub combatant: Combatant,
    /// Unit facing vector.
    pub facing: Vec2Fixed,
    /// Taking part in the current session.
    pub active: bool,
    /// Tick at which the turret comes online.
    pub activate_at: Option<u64>,
    /// Days of service left.
    pub turns_remaining: u32,
}

impl Damageable for Turret {
    fn combatant(&self) -> &Combatant {
        &self.combatant
    }

    fn combatant_mut(&mut self) -> &mut Combatant {
        &mut self.combatant
    }
}

impl Targeting for Turret {
    fn current_target(&self) -> Option<EntityId> {
        self.combatant.target()
    }

    fn target_lost(&mut self, target: EntityId, events: &mut Vec<GameEvent>) {
        self.combatant.forget_target(target, events);
    }
}

impl Simulation {
    /// Spawn an inactive turret that comes online next tick.
    pub(crate) fn spawn_turret(&mut self, position: Vec2Fixed) -> EntityId {
        let id = self.allocate_id();
        let stats = self.config.turret;
        let combatant = Combatant::new(id, Health::new(stats.max_hp), stats.attack, stats.defense, stats.shooting_period);
        self.turrets.insert(
            id,
            Turret {
                id,
                position,
                combatant,
                facing: Vec2Fixed::FORWARD,
                active: false,
                activate_at: Some(self.tick + 1),
                turns_remaining: self.config.turret_turns,
            },
        );
        id
    }

    /// Turret by id.
    #[must_use]
    pub fn turret(&self, id: EntityId) -> Option<&Turret> {
        self.turrets.get(id)
    }

    /// Put every turret to sleep for the night.
    pub(crate) fn deactivate_turrets(&mut self) {
        for id in self.turrets.sorted_ids() {
            let Some(turret) = self.turrets.get_mut(id) else {
                continue;
            };
            turret.active = false;
            turret.activate_at = None;
            let target = turret.combatant.target();
            if target.is_some() {
                turret.combatant.try_set_target(None, &mut self.death_watch, &mut self.pending);
            }
        }
    }

    /// Count down each turret's service days. Expired turrets are destroyed.
    pub(crate) fn expire_turrets(&mut self) -> Vec<EntityId> {
        let mut expired = Vec::new();
        for id in self.turrets.sorted_ids() {
            let Some(turret) = self.turrets.get_mut(id) else {
                continue;
            };
            turret.turns_remaining = turret.turns_remaining.saturating_sub(1);
            if turret.turns_remaining == 0 {
                expired.push(id);
            }
        }
        for id in &expired {
            info!(turret = id, "Turret out of service");
            self.remove_turret(*id);
        }
        expired
    }

    /// Schedule every turret to come online on the next tick.
    pub(crate) fn schedule_turret_activation(&mut self) {
        let next = self.tick + 1;
        for id in self.turrets.sorted_ids() {
            if let Some(turret) = self.turrets.get_mut(id) {
                if !turret.active && !turret.combatant.is_down() {
                    turret.activate_at = Some(next);
                }
            }
        }
    }

    pub(crate) fn remove_turret(&mut self, id: EntityId) {
        if self.turrets.remove(id).is_some() {
            self.death_watch.forget_holder(id);
            self.emit(GameEvent::EntityRemoved { entity: id });
        }
    }

    /// Activate pending turrets, then aim and fire the active ones.
    pub(crate) fn run_turret_system(&mut self, dt: Fixed) {
        let radii = self.config.radii;
        let cone = self.config.sight_cone();
        let turn_step = self.config.turret_turn_step(dt);

        for id in self.turrets.sorted_ids() {
            let Some(turret) = self.turrets.get_mut(id) else {
                continue;
            };

            if !turret.active {
                match turret.activate_at {
                    Some(at) if at <= self.tick => {
                        turret.active = true;
                        turret.activate_at = None;
                        self.pending.push(GameEvent::TurretActivated { turret: id });
                        debug!(turret = id, "Turret activated");
                    }
                    _ => continue,
                }
            }
            if turret.combatant.is_down() {
                continue;
            }
            turret.combatant.tick(dt);
            let position = turret.position;
            let combatant_snapshot = turret.combatant.clone();

            let candidates = self.enemies.sorted_ids().into_iter().filter_map(|enemy| {
                let alive = self.enemies.get(enemy).is_some_and(|e| !e.combatant.is_down());
                if !alive {
                    return None;
                }
                self.mover.position(enemy).map(|p| (enemy, p))
            });
            let target = nearest_of_capability(position, candidates, radii.long, |enemy| {
                self.mover
                    .position(*enemy)
                    .is_some_and(|p| combatant_snapshot.can_attack_at(classify(position, p, &radii)))
            });

            let Some(turret) = self.turrets.get_mut(id) else {
                continue;
            };
            turret
                .combatant
                .try_set_target(target, &mut self.death_watch, &mut self.pending);

            let Some((target, target_pos)) = target.and_then(|t| self.mover.position(t).map(|p| (t, p))) else {
                continue;
            };
            turret.facing = rotate_toward(turret.facing, target_pos - position, turn_step);
            if !is_in_sight(position, target_pos, turret.facing, &cone) {
                continue;
            }

            if let ShotOutcome::Hit { kind, amount } = resolve_shot(&mut turret.combatant, classify(position, target_pos, &radii)) {
                self.deliver_hit(id, target, kind, amount);
            }
        }
    }
}
