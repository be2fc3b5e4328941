//! Session runner: plays a scenario's attack to completion.

use std::collections::BTreeMap;

use serde::Serialize;
use siege_core::components::EntityId;
use siege_core::data::{CombatConfig, Order, ScenarioData};
use siege_core::events::GameEvent;
use siege_core::math::Fixed;
use siege_core::roster::DayReport;
use siege_core::simulation::{SessionPhase, Simulation};

use crate::loader::LoadError;

/// Headless run settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Tick budget; the session stops early once it resolves.
    pub max_ticks: u64,
    /// Simulated seconds per tick.
    pub dt: Fixed,
    /// Resolve the day after a finished session.
    pub resolve_day: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_ticks: 6000,
            dt: Fixed::ONE / Fixed::from_num(20),
            resolve_day: true,
        }
    }
}

/// Fate of one deployed squad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SquadSummary {
    /// Roster squad id.
    pub squad: u32,
    /// `destroyed`, `returned` or `in_field`.
    pub outcome: &'static str,
}

/// JSON summary of a headless session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Scenario name.
    pub scenario: String,
    /// Ticks simulated.
    pub ticks: u64,
    /// Every squad resolved before the tick budget ran out.
    pub resolved: bool,
    /// Per-squad outcome in deployment order.
    pub squads: Vec<SquadSummary>,
    /// Towers still standing with their HP.
    pub towers_remaining: Vec<f64>,
    /// Event count per channel.
    pub event_counts: BTreeMap<String, usize>,
    /// Orders the core refused.
    pub failed_orders: usize,
    /// State hash when the session stopped.
    pub final_state_hash: u64,
    /// Day resolution, when it ran.
    pub day_report: Option<DayReport>,
}

/// Outcome of repeated runs of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Number of runs.
    pub runs: u32,
    /// Final state hash of each run.
    pub hashes: Vec<u64>,
    /// All hashes matched.
    pub deterministic: bool,
}

/// Deploy the scenario's roster and play the session.
pub fn run_session(config: CombatConfig, scenario: &ScenarioData, run: RunConfig) -> Result<SessionSummary, LoadError> {
    let (mut sim, setup) = Simulation::from_scenario(config, scenario)?;
    let towers = sim.tower_ids();
    let deployed = sim.begin_attack(&setup)?;
    tracing::info!(scenario = %scenario.name, squads = deployed.len(), "Session started");

    let mut squads: Vec<SquadSummary> = deployed
        .iter()
        .filter_map(|unit| sim.squad_unit(*unit))
        .map(|unit| SquadSummary {
            squad: unit.squad.0,
            outcome: "in_field",
        })
        .collect();

    let orders = scenario.orders_by_tick();
    let mut next_order = 0;
    let mut failed_orders = 0;
    let mut event_counts: BTreeMap<String, usize> = BTreeMap::new();

    for _ in 0..run.max_ticks {
        while let Some(order) = orders.get(next_order).filter(|o| o.at_tick() <= sim.get_tick()) {
            if !apply_order(&mut sim, order, &towers) {
                failed_orders += 1;
            }
            next_order += 1;
        }

        let events = sim.tick(run.dt);
        for event in &events.events {
            *event_counts.entry(format!("{:?}", event.channel())).or_insert(0) += 1;
            let (squad, outcome) = match event {
                GameEvent::UnitDestroyed { squad, .. } => (*squad, "destroyed"),
                GameEvent::UnitReturnedToHq { squad, .. } => (*squad, "returned"),
                _ => continue,
            };
            if let Some(summary) = squads.iter_mut().find(|s| s.squad == squad.0) {
                summary.outcome = outcome;
            }
        }

        if sim.phase() != SessionPhase::Active {
            break;
        }
    }

    let resolved = sim.phase() == SessionPhase::Resolved;
    let final_state_hash = sim.state_hash();
    let towers_remaining = sim
        .tower_ids()
        .into_iter()
        .filter_map(|id| sim.tower(id))
        .map(|t| t.combatant.health.current.to_num::<f64>())
        .collect();

    let day_report = if resolved && run.resolve_day {
        Some(sim.end_day()?)
    } else {
        None
    };

    tracing::info!(ticks = sim.get_tick(), resolved, failed_orders, "Session finished");
    Ok(SessionSummary {
        scenario: scenario.name.clone(),
        ticks: sim.get_tick(),
        resolved,
        squads,
        towers_remaining,
        event_counts,
        failed_orders,
        final_state_hash,
        day_report,
    })
}

/// Run a scenario several times and compare the final state hashes.
pub fn verify_scenario(
    config: &CombatConfig,
    scenario: &ScenarioData,
    run: RunConfig,
    runs: u32,
) -> Result<VerifyReport, LoadError> {
    let run = RunConfig {
        resolve_day: false,
        ..run
    };
    let mut hashes = Vec::with_capacity(runs as usize);
    for _ in 0..runs {
        hashes.push(run_session(config.clone(), scenario, run)?.final_state_hash);
    }
    let deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    if !deterministic {
        tracing::warn!(?hashes, "Scenario runs diverged");
    }
    Ok(VerifyReport {
        runs,
        hashes,
        deterministic,
    })
}

/// Issue one scripted order. Returns `false` if it was refused.
fn apply_order(sim: &mut Simulation, order: &Order, towers: &[EntityId]) -> bool {
    let Some(unit) = sim.squad_unit_for(order.squad()) else {
        tracing::debug!(squad = %order.squad(), "Order for a squad no longer in the field");
        return false;
    };
    let result = match order {
        Order::Attack { tower, .. } => match towers.get(*tower) {
            Some(tower) => sim.request_move_to(unit, *tower).map(|_| ()),
            None => return false,
        },
        Order::Retreat { .. } => sim.retreat(unit),
    };
    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(squad = %order.squad(), %err, "Order refused");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use siege_core::hostiles::AttackCells;

    use super::*;

    const OUTPOST: &str = r#"
        ScenarioData(
            name: "test outpost",
            headquarters: Some((x: 4.0, y: 4.0)),
            spawn_points: [(x: 10.0, y: 10.0)],
            towers: [
                TowerData(
                    position: (x: 10.0, y: 40.0),
                    max_hp: 30.0,
                    attack: (short: 1.0, middle: 1.0, long: 1.0),
                ),
            ],
            roster: RosterData(
                soldiers: [
                    Soldier(id: (1), name: "Ada", max_hp: 40.0, current_hp: 40.0,
                        attack: (short: 8.0, middle: 6.0, long: 4.0), speed: 6.0),
                    Soldier(id: (2), name: "Bo", max_hp: 40.0, current_hp: 40.0,
                        attack: (short: 8.0, middle: 6.0, long: 4.0), speed: 6.0),
                ],
                squads: [
                    Squad(id: (1), name: "Alpha", slots: [Some((1)), Some((2)), None, None], engaged: true),
                ],
            ),
            orders: [
                Attack(squad: (1), tower: 0, at_tick: 0),
            ],
        )
    "#;

    fn outpost() -> ScenarioData {
        ScenarioData::from_ron_str(OUTPOST).expect("scenario parses")
    }

    #[test]
    fn test_attack_order_destroys_tower() {
        let summary = run_session(CombatConfig::default(), &outpost(), RunConfig::default()).expect("runs");
        assert!(summary.towers_remaining.is_empty());
        assert_eq!(summary.failed_orders, 0);
        assert_eq!(summary.event_counts.get("EntityRemoved"), Some(&1));
        assert_eq!(summary.squads[0].outcome, "in_field");
        assert!(!summary.resolved);
        assert!(summary.day_report.is_none());
    }

    #[test]
    fn test_retreat_order_resolves_day() {
        let mut scenario = outpost();
        scenario.orders.push(Order::Retreat {
            squad: siege_core::components::SquadId(1),
            at_tick: 1,
        });
        let summary = run_session(CombatConfig::default(), &scenario, RunConfig::default()).expect("runs");
        assert!(summary.resolved);
        assert_eq!(summary.squads[0].outcome, "returned");
        let report = summary.day_report.expect("day resolved");
        assert_eq!(report.day, 1);
        assert!(report.deaths.is_empty());
    }

    #[test]
    fn test_refused_order_is_counted() {
        let mut scenario = outpost();
        scenario.towers[0].attack_cells = Some(AttackCells::default());
        let run = RunConfig {
            max_ticks: 10,
            ..RunConfig::default()
        };
        let summary = run_session(CombatConfig::default(), &scenario, run).expect("runs");
        assert_eq!(summary.failed_orders, 1);
        assert_eq!(summary.ticks, 10);
        assert!(!summary.resolved);
    }

    #[test]
    fn test_verify_is_deterministic() {
        let report = verify_scenario(&CombatConfig::default(), &outpost(), RunConfig::default(), 3).expect("runs");
        assert_eq!(report.hashes.len(), 3);
        assert!(report.deterministic);
    }
}
