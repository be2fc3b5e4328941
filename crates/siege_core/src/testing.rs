//! Fixtures shared by the unit tests of the session systems.

use crate::combat::Combatant;
use crate::components::{EntityId, Health, RangeProfile, SoldierId, SquadId};
use crate::data::CombatConfig;
use crate::math::{Fixed, Vec2Fixed};
use crate::roster::{Roster, Soldier};
use crate::simulation::{AttackSetup, Simulation};
use crate::squad::Squad;

pub(crate) fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

pub(crate) fn vec2(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::new(fixed(x), fixed(y))
}

pub(crate) fn soldier(id: u32, hp: i32) -> Soldier {
    Soldier::new(
        SoldierId(id),
        format!("S{id}"),
        fixed(hp),
        RangeProfile::from_ints(8, 6, 4, 0),
        RangeProfile::from_ints(1, 1, 1, 0),
        fixed(4),
    )
}

/// Hostile combatant with the given attack and no defense.
pub(crate) fn hostile(hp: i32, attack: RangeProfile) -> Combatant {
    Combatant::new(0, Health::new(fixed(hp)), attack, RangeProfile::ZERO, Fixed::ONE)
}

/// One engaged squad deployed at (9, 9), headquarters at (1, 1).
///
/// Soldier combatants are reset to attack 8/6/4 with no defense so
/// damage in tests is exact.
pub(crate) fn deployed(soldiers: Vec<Soldier>) -> (Simulation, EntityId) {
    let rules = CombatConfig::default().roster;
    let mut roster = Roster::new();
    let mut squad = Squad::new(SquadId(1), "Alpha");
    squad.engaged = true;
    for (slot, s) in soldiers.into_iter().enumerate() {
        squad.slots[slot] = Some(s.id);
        roster.add_soldier(s);
    }
    roster.add_squad(squad, &rules);

    let mut sim = Simulation::with_defaults(CombatConfig::default(), roster);
    sim.set_headquarters(vec2(1, 1));
    let setup = AttackSetup {
        spawn_points: vec![vec2(9, 9)],
    };
    let squad = sim.begin_attack(&setup).expect("squad deploys")[0];
    for id in sim.soldier_units.sorted_ids() {
        if let Some(unit) = sim.soldier_units.get_mut(id) {
            unit.combatant.attack = RangeProfile::from_ints(8, 6, 4, 0);
            unit.combatant.defense = RangeProfile::ZERO;
        }
    }
    (sim, squad)
}

/// Members of a deployed squad in slot order.
pub(crate) fn members(sim: &Simulation, squad: EntityId) -> Vec<EntityId> {
    sim.squad_units.get(squad).map(|u| u.members.clone()).unwrap_or_default()
}

/// Position of a body registered with the mover.
pub(crate) fn at(sim: &Simulation, id: EntityId) -> Vec2Fixed {
    sim.mover.position(id).expect("body is placed")
}
