//! Deployed squads.
//!
//! A squad unit moves as one body and its soldiers follow in formation.
//! It seeks a tower, closes in, holds once the tower is in long range
//! and retreats to the headquarters on command.
//!
//! # State Machine
//!
//! ```text
//! Seeking --target--> Engaging --within long--> Holding
//!    ^                                             |
//!    +--------------- target leaves long ----------+
//!
//! any --retreat--> Retreating --near HQ--> ReturnedToHq
//! any --all soldiers down--> Destroyed
//! ```
//!
//! Attack positions are grid cells. Every squad may read the
//! [`DestinationClaims`] registry but only changes its own entry.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::combat::Targeting;
use crate::components::{EntityId, RangeClass, RangeKind, SpeedFactor, SquadId};
use crate::error::{Result, SiegeError};
use crate::events::GameEvent;
use crate::math::{rotate_toward, Fixed, Vec2Fixed};
use crate::navigation::GridCell;
use crate::range::{classify, nearest_of_capability, UNBOUNDED_RADIUS};
use crate::roster::ReturnedSoldier;
use crate::simulation::{SessionPhase, Simulation};
use crate::squad::Formation;

/// Squad unit lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SquadState {
    /// No target.
    Seeking,
    /// Target beyond long range.
    Engaging,
    /// Target within long range; protection stance.
    Holding,
    /// Heading back to headquarters.
    Retreating,
    /// Every soldier went down.
    Destroyed,
    /// Made it back to headquarters.
    ReturnedToHq,
}

impl SquadState {
    /// Check whether the unit has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, SquadState::Destroyed | SquadState::ReturnedToHq)
    }
}

/// Range fallback order starting from a preferred range.
#[must_use]
pub const fn fallback_order(preferred: RangeKind) -> [RangeKind; 3] {
    match preferred {
        RangeKind::Long => [RangeKind::Long, RangeKind::Middle, RangeKind::Short],
        RangeKind::Middle => [RangeKind::Middle, RangeKind::Short, RangeKind::Long],
        RangeKind::Short | RangeKind::Explosive => [RangeKind::Short, RangeKind::Middle, RangeKind::Long],
    }
}

/// Registry of destination cells claimed by squad units.
///
/// At most one squad owns a cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DestinationClaims {
    by_owner: BTreeMap<EntityId, GridCell>,
}

impl DestinationClaims {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell claimed by a squad.
    #[must_use]
    pub fn claim_of(&self, owner: EntityId) -> Option<GridCell> {
        self.by_owner.get(&owner).copied()
    }

    /// Squad that claimed a cell.
    #[must_use]
    pub fn owner_of(&self, cell: GridCell) -> Option<EntityId> {
        self.by_owner
            .iter()
            .find(|(_, claimed)| **claimed == cell)
            .map(|(owner, _)| *owner)
    }

    /// Check whether another squad claimed a cell.
    #[must_use]
    pub fn is_claimed_by_other(&self, cell: GridCell, me: EntityId) -> bool {
        self.owner_of(cell).is_some_and(|owner| owner != me)
    }

    /// Claim a cell for `owner`, replacing its previous claim.
    ///
    /// Returns the squad that held the cell before, which loses it.
    pub fn claim(&mut self, owner: EntityId, cell: GridCell) -> Option<EntityId> {
        let previous = self.owner_of(cell).filter(|o| *o != owner);
        if let Some(previous) = previous {
            self.by_owner.remove(&previous);
        }
        self.by_owner.insert(owner, cell);
        previous
    }

    /// Drop `owner`'s claim.
    pub fn release(&mut self, owner: EntityId) -> Option<GridCell> {
        self.by_owner.remove(&owner)
    }

    /// Number of claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_owner.len()
    }

    /// Check whether nothing is claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_owner.is_empty()
    }
}

/// A squad deployed in an attack session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SquadUnit {
    /// Entity id.
    pub id: EntityId,
    /// Roster squad it was deployed from.
    pub squad: SquadId,
    /// Soldier units in slot order.
    pub members: Vec<EntityId>,
    /// Tower being attacked.
    pub target: Option<EntityId>,
    /// Holding position near the target.
    pub protection_stance: bool,
    /// Heading back to headquarters.
    pub retreat_active: bool,
    /// Ordered destination not yet reached.
    pub fixed_destination: Option<Vec2Fixed>,
    /// Unit facing vector.
    pub facing: Vec2Fixed,
    /// Formation layout.
    pub formation: Formation,
    /// Range the squad attacks from.
    pub preferred_range: RangeKind,
    /// Distance within which a holding squad stops moving.
    pub max_stop_range: Fixed,
    /// Base movement speed.
    pub speed_base: Fixed,
    /// Product of active speed modifiers.
    pub speed_factor: SpeedFactor,
    /// Lifecycle state.
    pub state: SquadState,
    /// Bound to a UI selection.
    pub selected: bool,
}

impl SquadUnit {
    /// Effective movement speed.
    #[must_use]
    pub fn speed(&self) -> Fixed {
        self.speed_factor.apply(self.speed_base)
    }

    fn set_state(&mut self, state: SquadState) {
        if self.state != state {
            debug!(squad = self.id, from = ?self.state, to = ?state, "Squad state changed");
            self.state = state;
        }
        self.protection_stance = state == SquadState::Holding;
    }
}

impl Targeting for SquadUnit {
    fn current_target(&self) -> Option<EntityId> {
        self.target
    }

    fn target_lost(&mut self, target: EntityId, events: &mut Vec<GameEvent>) {
        if self.target != Some(target) {
            return;
        }
        self.target = None;
        events.push(GameEvent::TargetChanged {
            holder: self.id,
            target: None,
        });
        if !self.state.is_terminal() && !self.retreat_active {
            self.set_state(SquadState::Seeking);
        }
    }
}

impl Simulation {
    /// Squad unit by id.
    #[must_use]
    pub fn squad_unit(&self, id: EntityId) -> Option<&SquadUnit> {
        self.squad_units.get(id)
    }

    /// Squad unit deployed from a roster squad.
    #[must_use]
    pub fn squad_unit_for(&self, squad: SquadId) -> Option<EntityId> {
        self.squad_units
            .sorted_ids()
            .into_iter()
            .find(|id| self.squad_units.get(*id).is_some_and(|u| u.squad == squad))
    }

    /// Destination claims of every squad.
    #[must_use]
    pub const fn claims(&self) -> &DestinationClaims {
        &self.claims
    }

    /// Bind or release a squad's UI selection.
    pub fn set_selected(&mut self, squad: EntityId, selected: bool) -> Result<()> {
        let unit = self.squad_units.get_mut(squad).ok_or(SiegeError::EntityNotFound(squad))?;
        let was = unit.selected;
        unit.selected = selected;
        if was && !selected {
            self.emit(GameEvent::SelectionCleared { unit: squad });
        }
        Ok(())
    }

    pub(crate) fn set_squad_target(&mut self, id: EntityId, target: Option<EntityId>) {
        let Some(unit) = self.squad_units.get_mut(id) else {
            return;
        };
        if unit.target == target {
            return;
        }
        if let Some(old) = unit.target.take() {
            self.death_watch.unwatch(id, old);
        }
        if let Some(new) = target {
            self.death_watch.watch(id, new);
        }
        unit.target = target;
        self.pending.push(GameEvent::TargetChanged { holder: id, target });
    }

    /// Order a squad to attack a tower.
    ///
    /// Resolves an attack cell, claims it and starts moving. Squads
    /// holding or heading for that cell are displaced. When no cell is
    /// free the squad holds where it is and the error is returned.
    pub fn request_move_to(&mut self, squad: EntityId, tower: EntityId) -> Result<Vec2Fixed> {
        let unit = self.squad_units.get(squad).ok_or(SiegeError::EntityNotFound(squad))?;
        if unit.state.is_terminal() {
            return Err(SiegeError::EntityNotFound(squad));
        }
        if !self.towers.contains(tower) {
            return Err(SiegeError::EntityNotFound(tower));
        }

        self.set_squad_target(squad, Some(tower));
        if let Some(unit) = self.squad_units.get_mut(squad) {
            unit.retreat_active = false;
            unit.set_state(SquadState::Engaging);
        }

        let cell = match self.resolve_attack_position(squad, tower) {
            Ok(cell) => cell,
            Err(err) => {
                warn!(squad, tower, "No attack position, holding");
                self.hold_position(squad);
                self.flush_commands();
                return Err(err);
            }
        };

        let destination = self.claim_and_move(squad, cell);
        self.flush_commands();
        Ok(destination)
    }

    /// Order a squad to a position.
    pub fn order_move(&mut self, squad: EntityId, position: Vec2Fixed) -> Result<Vec2Fixed> {
        let unit = self.squad_units.get(squad).ok_or(SiegeError::EntityNotFound(squad))?;
        if unit.state.is_terminal() {
            return Err(SiegeError::EntityNotFound(squad));
        }
        let cell = self.terrain.cell_of(position);
        let destination = self.claim_and_move(squad, cell);
        self.flush_commands();
        Ok(destination)
    }

    /// Pick a free attack cell around a tower.
    ///
    /// Ranges are tried in the squad's fallback order. Within a range
    /// the cell nearest the squad wins, first listed on ties. Cells
    /// claimed by other squads and unwalkable cells are skipped.
    pub fn resolve_attack_position(&self, squad: EntityId, tower: EntityId) -> Result<GridCell> {
        let unit = self.squad_units.get(squad).ok_or(SiegeError::EntityNotFound(squad))?;
        let tower_ref = self.towers.get(tower).ok_or(SiegeError::EntityNotFound(tower))?;
        let origin = self.mover.position(squad).unwrap_or(tower_ref.position);

        for kind in fallback_order(unit.preferred_range) {
            let candidates = tower_ref
                .attack_cells
                .get(kind)
                .iter()
                .map(|cell| (*cell, self.terrain.cell_center(*cell)));
            let found = nearest_of_capability(origin, candidates, UNBOUNDED_RADIUS, |cell| {
                self.terrain.is_walkable(*cell) && !self.claims.is_claimed_by_other(*cell, squad)
            });
            if let Some(cell) = found {
                debug!(squad, tower, ?kind, x = cell.x, y = cell.y, "Attack position resolved");
                return Ok(cell);
            }
        }
        Err(SiegeError::NoAttackPosition { tower })
    }

    /// Claim a cell, displace its previous holders and travel there.
    fn claim_and_move(&mut self, squad: EntityId, cell: GridCell) -> Vec2Fixed {
        let destination = self.terrain.cell_center(cell);
        let mut displaced: Vec<EntityId> = self.claims.claim(squad, cell).into_iter().collect();

        // Soldiers of other squads standing in the cell
        for unit_id in self.soldier_units.sorted_ids() {
            let Some(unit) = self.soldier_units.get(unit_id) else {
                continue;
            };
            if unit.squad == squad || displaced.contains(&unit.squad) {
                continue;
            }
            let standing_here = self
                .mover
                .position(unit_id)
                .is_some_and(|p| self.terrain.cell_of(p) == cell);
            if standing_here {
                displaced.push(unit.squad);
            }
        }

        if let Some(unit) = self.squad_units.get_mut(squad) {
            unit.fixed_destination = Some(destination);
        }
        self.mover.set_destination(squad, destination);

        for other in displaced {
            if let Err(err) = self.move_after_replaced(other, cell) {
                warn!(squad = other, %err, "Displaced squad holds position");
            }
        }
        destination
    }

    /// Move a displaced squad to the nearest free cell around `contested`.
    ///
    /// `contested` is the cell the squad was pushed out of. Rings of
    /// radius 1 up to the configured maximum are searched. Among the
    /// nearest empty, unclaimed, walkable cells one is picked at random.
    pub fn move_after_replaced(&mut self, squad: EntityId, contested: GridCell) -> Result<Vec2Fixed> {
        let unit = self.squad_units.get(squad).ok_or(SiegeError::EntityNotFound(squad))?;
        if unit.state.is_terminal() {
            return Err(SiegeError::EntityNotFound(squad));
        }
        let contested_center = self.terrain.cell_center(contested);

        let occupied: Vec<GridCell> = self
            .soldier_units
            .sorted_ids()
            .into_iter()
            .filter(|id| self.soldier_units.get(*id).is_some_and(|u| u.squad != squad))
            .chain(self.squad_units.sorted_ids().into_iter().filter(|id| *id != squad))
            .filter_map(|id| self.mover.position(id))
            .map(|p| self.terrain.cell_of(p))
            .collect();

        for radius in 1..=self.config.displacement_max_radius {
            let mut nearest: Vec<GridCell> = Vec::new();
            let mut best = Fixed::MAX;
            for cell in contested.ring(radius) {
                let free = self.terrain.is_walkable(cell)
                    && self.claims.owner_of(cell).is_none()
                    && !occupied.contains(&cell);
                if !free {
                    continue;
                }
                let d = self.terrain.cell_center(cell).distance_squared(contested_center);
                if d < best {
                    best = d;
                    nearest.clear();
                    nearest.push(cell);
                } else if d == best {
                    nearest.push(cell);
                }
            }

            if !nearest.is_empty() {
                let pick = nearest[self.rng.gen_range(0..nearest.len())];
                debug!(squad, radius, x = pick.x, y = pick.y, "Displaced squad relocating");
                self.claims.claim(squad, pick);
                let destination = self.terrain.cell_center(pick);
                if let Some(unit) = self.squad_units.get_mut(squad) {
                    unit.fixed_destination = Some(destination);
                }
                self.mover.set_destination(squad, destination);
                return Ok(destination);
            }
        }

        self.hold_position(squad);
        Err(SiegeError::NoReplacementCell { squad })
    }

    fn hold_position(&mut self, squad: EntityId) {
        self.mover.stop(squad);
        if let Some(unit) = self.squad_units.get_mut(squad) {
            unit.fixed_destination = None;
        }
    }

    /// Send a squad back to headquarters.
    pub fn retreat(&mut self, squad: EntityId) -> Result<()> {
        let Some(hq) = self.headquarters else {
            tracing::error!(squad, "Retreat ordered without a headquarters");
            return Err(SiegeError::MissingHeadquarters);
        };
        let unit = self.squad_units.get(squad).ok_or(SiegeError::EntityNotFound(squad))?;
        if unit.state.is_terminal() {
            return Err(SiegeError::EntityNotFound(squad));
        }

        self.set_squad_target(squad, None);
        self.claims.release(squad);
        let Some(unit) = self.squad_units.get_mut(squad) else {
            return Err(SiegeError::EntityNotFound(squad));
        };
        unit.retreat_active = true;
        unit.fixed_destination = Some(hq);
        unit.set_state(SquadState::Retreating);
        let was_selected = unit.selected;
        unit.selected = false;

        self.mover.set_destination(squad, hq);
        if was_selected {
            self.emit(GameEvent::SelectionCleared { unit: squad });
        }
        info!(squad, "Squad retreating");
        self.flush_commands();
        Ok(())
    }

    /// Tear the squad down as destroyed if every soldier is down.
    ///
    /// Returns `true` on the transition. Calling it again, or on a squad
    /// already torn down, does nothing.
    pub fn check_death(&mut self, squad: EntityId) -> bool {
        let Some(unit) = self.squad_units.get(squad) else {
            return false;
        };
        if unit.state.is_terminal() {
            return false;
        }
        let all_down = unit.members.iter().all(|m| {
            self.soldier_units
                .get(*m)
                .map_or(true, |u| u.combatant.health.current <= Fixed::ZERO)
        });
        if !all_down {
            return false;
        }

        let roster_squad = unit.squad;
        let fallen: Vec<_> = unit
            .members
            .iter()
            .filter_map(|m| self.soldier_units.get(*m).map(|u| u.soldier))
            .collect();
        let rules = self.config.roster;
        for soldier in fallen {
            self.roster.record_death(soldier, &rules);
        }
        if let Err(err) = self.roster.set_engaged(roster_squad, false) {
            warn!(%err, "Destroyed squad missing from roster");
        }

        if let Some(unit) = self.squad_units.get_mut(squad) {
            unit.set_state(SquadState::Destroyed);
        }
        info!(squad, %roster_squad, "Squad destroyed");
        self.emit(GameEvent::UnitDestroyed {
            unit: squad,
            squad: roster_squad,
        });
        self.teardown_squad(squad);
        true
    }

    /// Write a returning squad back into the roster and tear it down.
    fn return_to_hq(&mut self, squad: EntityId) {
        let Some(unit) = self.squad_units.get_mut(squad) else {
            return;
        };
        if unit.state.is_terminal() {
            return;
        }
        unit.set_state(SquadState::ReturnedToHq);
        let roster_squad = unit.squad;
        let returned: Vec<ReturnedSoldier> = unit
            .members
            .iter()
            .filter_map(|m| self.soldier_units.get(*m))
            .map(|u| ReturnedSoldier {
                soldier: u.soldier,
                hp: u.combatant.health.current,
                damage_dealt: u.damage_dealt,
            })
            .collect();

        let rules = self.config.roster;
        self.roster.return_from_session(roster_squad, &returned, &rules);
        info!(squad, %roster_squad, "Squad returned to headquarters");
        self.emit(GameEvent::UnitReturnedToHq {
            unit: squad,
            squad: roster_squad,
        });
        self.teardown_squad(squad);
    }

    /// Remove a terminal squad and its soldiers from the session.
    fn teardown_squad(&mut self, squad: EntityId) {
        self.claims.release(squad);
        self.death_watch.forget_holder(squad);
        let Some(unit) = self.squad_units.remove(squad) else {
            return;
        };
        for member in &unit.members {
            self.soldier_units.remove(*member);
            self.death_watch.forget_holder(*member);
            for holder in self.death_watch.take_watchers(*member) {
                self.notify_target_lost(holder, *member);
            }
            self.mover.remove(*member);
        }
        self.mover.remove(squad);
        if unit.selected {
            self.emit(GameEvent::SelectionCleared { unit: squad });
        }

        if self.squad_units.is_empty() && self.phase == SessionPhase::Active {
            self.phase = SessionPhase::Resolved;
            info!(tick = self.tick, "Attack session resolved");
            self.emit(GameEvent::SessionResolved);
        }
    }

    /// Advance every squad unit.
    pub(crate) fn run_squad_system(&mut self, dt: Fixed) {
        for id in self.squad_units.sorted_ids() {
            self.tick_squad(id, dt);
        }
    }

    fn tick_squad(&mut self, id: EntityId, dt: Fixed) {
        let Some(unit) = self.squad_units.get(id) else {
            return;
        };
        if unit.state.is_terminal() {
            return;
        }
        let Some(position) = self.mover.position(id) else {
            return;
        };
        let radii = self.config.radii;
        let turn_step = self.config.squad_turn_step(dt);

        if unit.retreat_active {
            let arrived = self.headquarters.is_some_and(|hq| {
                let r = self.config.hq_arrival_radius;
                position.distance_squared(hq) <= r * r
            });
            if arrived {
                self.return_to_hq(id);
                return;
            }
            self.face_travel(id, turn_step);
            self.formation_upkeep(id, position);
            return;
        }

        // Auto-acquire a tower within short or middle range
        if unit.target.is_none() {
            let candidates = self
                .towers
                .sorted_ids()
                .into_iter()
                .filter_map(|t| self.towers.get(t).map(|tower| (t, tower.position)));
            let found = nearest_of_capability(position, candidates, radii.middle, |t| {
                self.towers.get(*t).is_some_and(|tower| !tower.combatant.is_down())
            });
            if let Some(tower) = found {
                debug!(squad = id, tower, "Squad acquired tower");
                self.set_squad_target(id, Some(tower));
            }
        }

        let Some(unit) = self.squad_units.get(id) else {
            return;
        };
        let target = unit
            .target
            .and_then(|t| self.towers.get(t).map(|tower| (t, tower.position)));

        match target {
            Some((_, target_pos)) => {
                let band = classify(position, target_pos, &radii);
                let within_stop = position.distance_squared(target_pos) <= unit.max_stop_range * unit.max_stop_range;
                let stopped = self.mover.is_stopped(id);
                let pending = unit.fixed_destination;
                let was_holding = unit.state == SquadState::Holding;

                if let Some(unit) = self.squad_units.get_mut(id) {
                    unit.facing = rotate_toward(unit.facing, target_pos - position, turn_step);
                }

                if band == RangeClass::OutOfRange {
                    if was_holding {
                        debug!(squad = id, "Target left long range, disengaging");
                        self.set_squad_target(id, None);
                        if let Some(unit) = self.squad_units.get_mut(id) {
                            unit.set_state(SquadState::Seeking);
                        }
                    } else if let Some(unit) = self.squad_units.get_mut(id) {
                        unit.set_state(SquadState::Engaging);
                    }
                } else {
                    if let Some(unit) = self.squad_units.get_mut(id) {
                        unit.set_state(SquadState::Holding);
                    }
                    if pending.is_some() && stopped {
                        if let Some(unit) = self.squad_units.get_mut(id) {
                            unit.fixed_destination = None;
                        }
                    } else if pending.is_none() && within_stop && !stopped {
                        let cell = self.terrain.cell_of(position);
                        if self.claims.is_claimed_by_other(cell, id) {
                            // Someone else owns this cell, step aside
                            if let Err(err) = self.move_after_replaced(id, cell) {
                                warn!(squad = id, %err, "No free cell next to a claimed one");
                            }
                        } else {
                            self.claims.claim(id, cell);
                            self.mover.set_destination(id, self.terrain.cell_center(cell));
                            debug!(squad = id, x = cell.x, y = cell.y, "Holding at current cell");
                        }
                    }
                }
            }
            None => {
                if let Some(unit) = self.squad_units.get_mut(id) {
                    if unit.target.is_some() {
                        // Target id points at a removed tower
                        unit.target = None;
                    }
                    unit.set_state(SquadState::Seeking);
                }
                if self.squad_units.get(id).is_some_and(|u| u.fixed_destination.is_some()) && self.mover.is_stopped(id) {
                    if let Some(unit) = self.squad_units.get_mut(id) {
                        unit.fixed_destination = None;
                    }
                }
                self.face_travel(id, turn_step);
            }
        }

        let position = self.mover.position(id).unwrap_or(position);
        self.formation_upkeep(id, position);
    }

    fn face_travel(&mut self, id: EntityId, turn_step: Fixed) {
        let velocity = self.mover.velocity(id);
        if velocity.is_zero() {
            return;
        }
        if let Some(unit) = self.squad_units.get_mut(id) {
            unit.facing = rotate_toward(unit.facing, velocity, turn_step);
        }
    }

    /// Re-issue member destinations while the squad is moving.
    fn formation_upkeep(&mut self, id: EntityId, position: Vec2Fixed) {
        if self.mover.is_stopped(id) {
            return;
        }
        let Some(unit) = self.squad_units.get(id) else {
            return;
        };
        let facing = unit.facing;
        let formation = unit.formation;
        let mut orders = Vec::with_capacity(unit.members.len());
        for member in &unit.members {
            let Some(soldier) = self.soldier_units.get(*member) else {
                continue;
            };
            if soldier.combatant.is_down() {
                continue;
            }
            orders.push((*member, position + formation.offset(soldier.slot).local_to_world(facing)));
        }
        for (member, destination) in orders {
            self.mover.set_destination(member, destination);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::RangeProfile;
    use crate::testing::{at, deployed, hostile, soldier, vec2};

    #[test]
    fn test_fallback_orders() {
        assert_eq!(
            fallback_order(RangeKind::Long),
            [RangeKind::Long, RangeKind::Middle, RangeKind::Short]
        );
        assert_eq!(
            fallback_order(RangeKind::Middle),
            [RangeKind::Middle, RangeKind::Short, RangeKind::Long]
        );
        assert_eq!(
            fallback_order(RangeKind::Short),
            [RangeKind::Short, RangeKind::Middle, RangeKind::Long]
        );
    }

    #[test]
    fn test_claims_are_exclusive() {
        let mut claims = DestinationClaims::new();
        let cell = GridCell::new(2, 3);

        assert_eq!(claims.claim(1, cell), None);
        assert!(claims.is_claimed_by_other(cell, 2));
        assert!(!claims.is_claimed_by_other(cell, 1));

        // Taking the cell evicts the previous owner
        assert_eq!(claims.claim(2, cell), Some(1));
        assert_eq!(claims.claim_of(1), None);
        assert_eq!(claims.owner_of(cell), Some(2));

        // Re-claiming moves the owner's single claim
        claims.claim(2, GridCell::new(0, 0));
        assert_eq!(claims.owner_of(cell), None);
        assert_eq!(claims.len(), 1);

        assert_eq!(claims.release(2), Some(GridCell::new(0, 0)));
        assert!(claims.is_empty());
    }

    #[test]
    fn test_holding_squad_disengages_when_target_leaves_long_range() {
        let (mut sim, squad) = deployed(vec![soldier(1, 40)]);
        let position = at(&sim, squad);
        let tower = sim.add_tower(position + vec2(0, 10), hostile(30, RangeProfile::ZERO), None);
        let dt = Fixed::from_num(0.1);

        sim.tick_squad(squad, dt);
        assert_eq!(sim.target_of(squad), Some(tower));
        assert_eq!(sim.squad_unit(squad).map(|u| u.state), Some(SquadState::Holding));

        sim.towers.get_mut(tower).expect("tower").position = position + vec2(0, 30);
        sim.tick_squad(squad, dt);
        assert_eq!(sim.target_of(squad), None);
        let unit = sim.squad_unit(squad).expect("squad");
        assert_eq!(unit.state, SquadState::Seeking);
        assert!(!unit.protection_stance);
        assert!(sim.death_watch.watchers_of(tower).is_empty());
    }

    #[test]
    fn test_engaging_squad_keeps_a_distant_target() {
        let (mut sim, squad) = deployed(vec![soldier(1, 40)]);
        let tower = sim.add_tower(at(&sim, squad) + vec2(0, 40), hostile(30, RangeProfile::ZERO), None);
        sim.set_squad_target(squad, Some(tower));

        sim.tick_squad(squad, Fixed::from_num(0.1));
        assert_eq!(sim.target_of(squad), Some(tower));
        assert_eq!(sim.squad_unit(squad).map(|u| u.state), Some(SquadState::Engaging));
    }

    #[test]
    fn test_holding_squad_claims_its_own_cell() {
        let (mut sim, squad) = deployed(vec![soldier(1, 40)]);
        let position = at(&sim, squad);
        sim.add_tower(position + vec2(0, 4), hostile(30, RangeProfile::ZERO), None);
        let cell = sim.terrain.cell_of(position);
        // Drifting with no ordered destination
        sim.mover.set_destination(squad, position + vec2(1, 0));

        sim.tick_squad(squad, Fixed::from_num(0.1));
        assert_eq!(sim.claims.claim_of(squad), Some(cell));
        assert_eq!(sim.squad_unit(squad).map(|u| u.state), Some(SquadState::Holding));
    }

    #[test]
    fn test_holding_squad_steps_off_a_claimed_cell() {
        let (mut sim, squad) = deployed(vec![soldier(1, 40)]);
        let position = at(&sim, squad);
        sim.add_tower(position + vec2(0, 4), hostile(30, RangeProfile::ZERO), None);
        let cell = sim.terrain.cell_of(position);
        let rival = squad + 100;
        sim.claims.claim(rival, cell);
        sim.mover.set_destination(squad, position + vec2(1, 0));

        sim.tick_squad(squad, Fixed::from_num(0.1));
        assert_eq!(sim.claims.owner_of(cell), Some(rival));
        let relocated = sim.claims.claim_of(squad).expect("squad claims a free cell");
        assert_eq!(relocated.ring_distance(cell), 1);
        assert_eq!(
            sim.squad_unit(squad).and_then(|u| u.fixed_destination),
            Some(sim.terrain.cell_center(relocated))
        );
    }
}
