//! Test fixtures and helpers.
//!
//! Pre-built rosters, battlefields and recording collaborators
//! for consistent testing.

use std::cell::RefCell;
use std::rc::Rc;

use fixed::types::I32F32;
use siege_core::combat::Combatant;
use siege_core::components::{Capabilities, EntityId, Health, RangeProfile, SoldierId, SquadId};
use siege_core::data::CombatConfig;
use siege_core::math::{Fixed, Vec2Fixed};
use siege_core::navigation::{GridTerrain, IndicatorBridge, IndicatorHandle, StraightLineMover};
use siege_core::roster::{Roster, Soldier};
use siege_core::simulation::{AttackSetup, Collaborators, Simulation};
use siege_core::squad::Squad;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a vector from integer coordinates.
#[must_use]
pub fn vec2(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// A healthy rifleman with 8/6/4 attack and 1 defense everywhere.
#[must_use]
pub fn soldier(id: u32, hp: i32) -> Soldier {
    Soldier::new(
        SoldierId(id),
        format!("Soldier {id}"),
        fixed(hp),
        RangeProfile::from_ints(8, 6, 4, 0),
        RangeProfile::from_ints(1, 1, 1, 0),
        fixed(4),
    )
}

/// Add a four-soldier squad to a roster. Soldier ids start at `first_soldier`.
pub fn add_squad(roster: &mut Roster, squad: u32, first_soldier: u32, hp: i32, engaged: bool) -> SquadId {
    let rules = CombatConfig::default().roster;
    let id = SquadId(squad);
    let mut squad = Squad::new(id, format!("Squad {}", id.0));
    squad.engaged = engaged;
    for slot in 0..4 {
        let soldier_id = first_soldier + slot;
        roster.add_soldier(soldier(soldier_id, hp));
        squad.slots[slot as usize] = Some(SoldierId(soldier_id));
    }
    roster.add_squad(squad, &rules);
    id
}

/// A roster with `count` engaged squads of four 40 HP soldiers.
#[must_use]
pub fn roster_with_squads(count: u32) -> Roster {
    let mut roster = Roster::new();
    for n in 0..count {
        add_squad(&mut roster, n + 1, n * 4 + 1, 40, true);
    }
    roster
}

/// Grant a capability to a roster soldier.
pub fn grant(roster: &mut Roster, soldier: u32, capability: Capabilities) {
    if let Some(s) = roster.soldier_mut(SoldierId(soldier)) {
        s.capabilities |= capability;
    }
}

/// Tower stats: `hp` health, 3/2/1 attack, zero defense.
#[must_use]
pub fn tower_combatant(hp: i32) -> Combatant {
    Combatant::new(
        0,
        Health::new(fixed(hp)),
        RangeProfile::from_ints(3, 2, 1, 0),
        RangeProfile::ZERO,
        Fixed::ONE,
    )
}

/// An enemy with `hp` health that only fights at short range.
#[must_use]
pub fn enemy_combatant(hp: i32) -> Combatant {
    Combatant::new(
        0,
        Health::new(fixed(hp)),
        RangeProfile::from_ints(2, 0, 0, 0),
        RangeProfile::ZERO,
        Fixed::ONE,
    )
}

/// Spawn setup with one point at (9, 9).
#[must_use]
pub fn default_setup() -> AttackSetup {
    AttackSetup {
        spawn_points: vec![vec2(9, 9)],
    }
}

/// A simulation on a 64x64 open grid with the headquarters at (3, 3).
#[must_use]
pub fn battlefield(roster: Roster) -> Simulation {
    battlefield_with(CombatConfig::default(), roster)
}

/// Like [`battlefield`] with a custom config.
#[must_use]
pub fn battlefield_with(config: CombatConfig, roster: Roster) -> Simulation {
    let mut sim = Simulation::with_defaults(config, roster);
    sim.set_headquarters(vec2(3, 3));
    sim
}

/// A battlefield whose indicators are recorded into the returned log.
#[must_use]
pub fn battlefield_recording(roster: Roster) -> (Simulation, Rc<RefCell<IndicatorLog>>) {
    battlefield_recording_with(CombatConfig::default(), roster)
}

/// Like [`battlefield_recording`] with a custom config.
#[must_use]
pub fn battlefield_recording_with(config: CombatConfig, roster: Roster) -> (Simulation, Rc<RefCell<IndicatorLog>>) {
    let indicators = RecordingIndicators::default();
    let log = indicators.log();
    let collaborators = Collaborators {
        mover: Box::new(StraightLineMover::new()),
        terrain: Box::new(GridTerrain::new(64, 64, config.cell_size)),
        indicators: Box::new(indicators),
    };
    let mut sim = Simulation::new(config, roster, collaborators);
    sim.set_headquarters(vec2(3, 3));
    (sim, log)
}

/// Two squads deployed against one tower, both ordered to attack.
///
/// Deterministic given the config seed. Used by determinism tests and
/// benchmarks.
#[must_use]
pub fn siege_scenario() -> Simulation {
    let mut sim = battlefield(roster_with_squads(2));
    let tower = sim.add_tower(vec2(41, 41), tower_combatant(200), None);
    sim.add_enemy(vec2(30, 30), enemy_combatant(30));
    let squads = match sim.begin_attack(&default_setup()) {
        Ok(squads) => squads,
        Err(err) => panic!("siege scenario failed to deploy: {err}"),
    };
    for squad in squads {
        // A squad without a free cell holds; that is still a valid scenario
        let _ = sim.request_move_to(squad, tower);
    }
    sim
}

/// Indicator activity captured by [`RecordingIndicators`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorLog {
    /// Anchors of created indicators, by handle order.
    pub created: Vec<(IndicatorHandle, Vec2Fixed)>,
    /// Every update in order.
    pub updates: Vec<(IndicatorHandle, Fixed, Fixed)>,
    /// Removed handles in order.
    pub removed: Vec<IndicatorHandle>,
}

impl IndicatorLog {
    /// Handles created and not yet removed.
    #[must_use]
    pub fn live(&self) -> Vec<IndicatorHandle> {
        self.created
            .iter()
            .map(|(handle, _)| *handle)
            .filter(|handle| !self.removed.contains(handle))
            .collect()
    }

    /// Last value reported for a handle.
    #[must_use]
    pub fn last_value(&self, handle: IndicatorHandle) -> Option<(Fixed, Fixed)> {
        self.updates
            .iter()
            .rev()
            .find(|(h, _, _)| *h == handle)
            .map(|(_, current, max)| (*current, *max))
    }
}

/// Indicator bridge that records every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingIndicators {
    next: u64,
    log: Rc<RefCell<IndicatorLog>>,
}

impl RecordingIndicators {
    /// Shared handle to the log.
    #[must_use]
    pub fn log(&self) -> Rc<RefCell<IndicatorLog>> {
        Rc::clone(&self.log)
    }
}

impl IndicatorBridge for RecordingIndicators {
    fn create_indicator(&mut self, anchor: Vec2Fixed) -> IndicatorHandle {
        self.next += 1;
        let handle = IndicatorHandle(self.next);
        self.log.borrow_mut().created.push((handle, anchor));
        handle
    }

    fn update_indicator(&mut self, handle: IndicatorHandle, current: Fixed, max: Fixed) {
        self.log.borrow_mut().updates.push((handle, current, max));
    }

    fn remove_indicator(&mut self, handle: IndicatorHandle) {
        self.log.borrow_mut().removed.push(handle);
    }
}

/// Soldier unit ids of a squad unit in slot order.
#[must_use]
pub fn members_of(sim: &Simulation, squad: EntityId) -> Vec<EntityId> {
    sim.squad_unit(squad).map(|u| u.members.clone()).unwrap_or_default()
}
