//! Enemy towers and mobile enemies.
//!
//! Towers are the squads' objectives. Each carries precomputed attack
//! cells per range band that squads resolve their destinations from.
//! Both towers and enemies fire back at the nearest living soldier.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::combat::{resolve_shot, Combatant, Damageable, ShotOutcome, Targeting};
use crate::components::{EntityId, RangeKind};
use crate::events::GameEvent;
use crate::math::{Fixed, Vec2Fixed};
use crate::navigation::{GridCell, Terrain};
use crate::range::{classify, nearest_of_capability, RangeRadii};
use crate::simulation::Simulation;

/// Attack cells around a tower, one list per distance range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackCells {
    /// Cells within the short radius.
    pub short: Vec<GridCell>,
    /// Cells between the short and middle radii.
    pub middle: Vec<GridCell>,
    /// Cells between the middle and long radii.
    pub long: Vec<GridCell>,
}

impl AttackCells {
    /// Cells for a range. Explosive maps to short.
    #[must_use]
    pub fn get(&self, kind: RangeKind) -> &[GridCell] {
        match kind {
            RangeKind::Short | RangeKind::Explosive => &self.short,
            RangeKind::Middle => &self.middle,
            RangeKind::Long => &self.long,
        }
    }

    /// Mutable cells for a range. Explosive maps to short.
    pub fn get_mut(&mut self, kind: RangeKind) -> &mut Vec<GridCell> {
        match kind {
            RangeKind::Short | RangeKind::Explosive => &mut self.short,
            RangeKind::Middle => &mut self.middle,
            RangeKind::Long => &mut self.long,
        }
    }

    /// Generate walkable cells around a position, banded by distance.
    ///
    /// The tower's own cell is excluded. Cells are listed row-major.
    #[must_use]
    pub fn generate(center: Vec2Fixed, radii: &RangeRadii, terrain: &dyn Terrain) -> Self {
        let mut cells = Self::default();
        let origin = terrain.cell_of(center);
        let corner = terrain.cell_of(Vec2Fixed::new(center.x + radii.long, center.y + radii.long));
        let reach = (corner.x - origin.x).max(corner.y - origin.y).max(1);

        for y in origin.y - reach..=origin.y + reach {
            for x in origin.x - reach..=origin.x + reach {
                let cell = GridCell::new(x, y);
                if cell == origin || !terrain.is_walkable(cell) {
                    continue;
                }
                let band = classify(center, terrain.cell_center(cell), radii);
                if let Some(kind) = band.kind() {
                    cells.get_mut(kind).push(cell);
                }
            }
        }
        cells
    }
}

/// An enemy tower.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tower {
    /// Entity id.
    pub id: EntityId,
    /// World position.
    pub position: Vec2Fixed,
    /// Combat state.
    pub combatant: Combatant,
    /// Cells squads attack from.
    pub attack_cells: AttackCells,
}

/// A mobile enemy, moved by the external mover.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Enemy {
    /// Entity id.
    pub id: EntityId,
    /// Combat state.
    pub combatant: Combatant,
}

impl Damageable for Tower {
    fn combatant(&self) -> &Combatant {
        &self.combatant
    }

    fn combatant_mut(&mut self) -> &mut Combatant {
        &mut self.combatant
    }
}

impl Targeting for Tower {
    fn current_target(&self) -> Option<EntityId> {
        self.combatant.target()
    }

    fn target_lost(&mut self, target: EntityId, events: &mut Vec<GameEvent>) {
        self.combatant.forget_target(target, events);
    }
}

impl Damageable for Enemy {
    fn combatant(&self) -> &Combatant {
        &self.combatant
    }

    fn combatant_mut(&mut self) -> &mut Combatant {
        &mut self.combatant
    }
}

impl Targeting for Enemy {
    fn current_target(&self) -> Option<EntityId> {
        self.combatant.target()
    }

    fn target_lost(&mut self, target: EntityId, events: &mut Vec<GameEvent>) {
        self.combatant.forget_target(target, events);
    }
}

impl Simulation {
    /// Add a tower. Its combatant id is replaced by the allocated one.
    ///
    /// Without explicit attack cells, cells are generated from the terrain.
    pub fn add_tower(&mut self, position: Vec2Fixed, mut combatant: Combatant, attack_cells: Option<AttackCells>) -> EntityId {
        let id = self.allocate_id();
        combatant.id = id;
        let attack_cells =
            attack_cells.unwrap_or_else(|| AttackCells::generate(position, &self.config.radii, self.terrain.as_ref()));
        self.towers.insert(
            id,
            Tower {
                id,
                position,
                combatant,
                attack_cells,
            },
        );
        id
    }

    /// Add a mobile enemy at a position.
    pub fn add_enemy(&mut self, position: Vec2Fixed, mut combatant: Combatant) -> EntityId {
        let id = self.allocate_id();
        combatant.id = id;
        self.mover.place(id, position);
        self.enemies.insert(id, Enemy { id, combatant });
        id
    }

    /// Tower by id.
    #[must_use]
    pub fn tower(&self, id: EntityId) -> Option<&Tower> {
        self.towers.get(id)
    }

    /// Enemy by id.
    #[must_use]
    pub fn enemy(&self, id: EntityId) -> Option<&Enemy> {
        self.enemies.get(id)
    }

    pub(crate) fn remove_tower(&mut self, id: EntityId) {
        if self.towers.remove(id).is_some() {
            self.death_watch.forget_holder(id);
            self.emit(GameEvent::EntityRemoved { entity: id });
            debug!(tower = id, "Tower destroyed");
        }
    }

    pub(crate) fn remove_enemy(&mut self, id: EntityId) {
        if self.enemies.remove(id).is_some() {
            self.mover.remove(id);
            self.death_watch.forget_holder(id);
            self.emit(GameEvent::EntityRemoved { entity: id });
        }
    }

    /// Nearest living soldier a hostile at `position` can hit.
    fn hostile_target(&self, position: Vec2Fixed, shooter: &Combatant) -> Option<EntityId> {
        let radii = self.config.radii;
        let candidates = self.soldier_units.sorted_ids().into_iter().filter_map(|unit| {
            let alive = self.soldier_units.get(unit).is_some_and(|u| !u.combatant.is_down());
            if !alive {
                return None;
            }
            self.mover.position(unit).map(|p| (unit, p))
        });
        nearest_of_capability(position, candidates, radii.long, |unit| {
            self.mover
                .position(*unit)
                .is_some_and(|p| shooter.can_attack_at(classify(position, p, &radii)))
        })
    }

    /// Towers, then enemies, each fire at the nearest soldier in reach.
    pub(crate) fn run_hostile_system(&mut self, dt: Fixed) {
        let radii = self.config.radii;

        for id in self.towers.sorted_ids() {
            let Some(tower) = self.towers.get_mut(id) else {
                continue;
            };
            if tower.combatant.is_down() {
                continue;
            }
            tower.combatant.tick(dt);
            let position = tower.position;
            let snapshot = tower.combatant.clone();

            let target = self.hostile_target(position, &snapshot);
            let Some(tower) = self.towers.get_mut(id) else {
                continue;
            };
            tower
                .combatant
                .try_set_target(target, &mut self.death_watch, &mut self.pending);

            let Some((target, target_pos)) = target.and_then(|t| self.mover.position(t).map(|p| (t, p))) else {
                continue;
            };
            if let ShotOutcome::Hit { kind, amount } = resolve_shot(&mut tower.combatant, classify(position, target_pos, &radii)) {
                self.deliver_hit(id, target, kind, amount);
            }
        }

        for id in self.enemies.sorted_ids() {
            let Some(enemy) = self.enemies.get_mut(id) else {
                continue;
            };
            if enemy.combatant.is_down() {
                continue;
            }
            enemy.combatant.tick(dt);
            let snapshot = enemy.combatant.clone();
            let Some(position) = self.mover.position(id) else {
                continue;
            };

            let target = self.hostile_target(position, &snapshot);
            let Some(enemy) = self.enemies.get_mut(id) else {
                continue;
            };
            enemy
                .combatant
                .try_set_target(target, &mut self.death_watch, &mut self.pending);

            let Some((target, target_pos)) = target.and_then(|t| self.mover.position(t).map(|p| (t, p))) else {
                continue;
            };
            if let ShotOutcome::Hit { kind, amount } = resolve_shot(&mut enemy.combatant, classify(position, target_pos, &radii)) {
                self.deliver_hit(id, target, kind, amount);
            }
        }
    }
}
