//! Runs the bundled scenario files end to end.

use std::io::Write;
use std::path::PathBuf;

use siege_core::simulation::Simulation;
use siege_headless::{load_config, load_scenario, run_session, verify_scenario, LoadError, RunConfig};

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(name)
}

#[test]
fn test_bundled_files_load() {
    let scenario = load_scenario(&scenario_path("outpost.ron")).expect("outpost loads");
    let config = load_config(&scenario_path("combat.ron")).expect("config loads");

    assert_eq!(scenario.name, "outpost");
    assert_eq!(scenario.towers.len(), 2);
    assert_eq!(scenario.roster.squads.len(), 2);
    assert_eq!(config.rng_seed, 1234);

    let (sim, setup) = Simulation::from_scenario(config, &scenario).expect("builds");
    assert_eq!(sim.tower_ids().len(), 2);
    assert_eq!(setup.spawn_points.len(), 2);
    assert!(sim.headquarters().is_some());
}

#[test]
fn test_outpost_session_resolves() {
    let scenario = load_scenario(&scenario_path("outpost.ron")).expect("outpost loads");
    let config = load_config(&scenario_path("combat.ron")).expect("config loads");

    let summary = run_session(config, &scenario, RunConfig::default()).expect("runs");

    assert!(summary.resolved, "both squads retreat or fall before the budget");
    assert_eq!(summary.squads.len(), 2);
    assert!(summary.squads.iter().all(|s| s.outcome != "in_field"));
    assert!(summary.day_report.is_some());
    let json = serde_json::to_string(&summary).expect("serializes");
    assert!(json.contains("\"scenario\":\"outpost\""));
}

#[test]
fn test_outpost_is_deterministic() {
    let scenario = load_scenario(&scenario_path("outpost.ron")).expect("outpost loads");
    let config = load_config(&scenario_path("combat.ron")).expect("config loads");
    let run = RunConfig {
        max_ticks: 800,
        ..RunConfig::default()
    };

    let report = verify_scenario(&config, &scenario, run, 3).expect("runs");

    assert!(report.deterministic, "hashes: {:?}", report.hashes);
}

#[test]
fn test_scenario_without_headquarters_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"ScenarioData(
            name: "no hq",
            spawn_points: [(x: 5.0, y: 5.0)],
            roster: RosterData(
                soldiers: [Soldier(id: (1), name: "Ada", max_hp: 40.0, current_hp: 40.0, speed: 4.0)],
                squads: [Squad(id: (1), slots: [Some((1)), None, None, None], engaged: true)],
            ),
        )"#
    )
    .expect("write");

    let scenario = load_scenario(file.path()).expect("parses");
    let result = run_session(siege_core::data::CombatConfig::default(), &scenario, RunConfig::default());

    assert!(matches!(
        result,
        Err(LoadError::Siege(siege_core::error::SiegeError::MissingHeadquarters))
    ));
}

#[test]
fn test_unknown_squad_in_orders_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"ScenarioData(
            headquarters: Some((x: 5.0, y: 5.0)),
            orders: [Retreat(squad: (4))],
        )"#
    )
    .expect("write");

    assert!(matches!(
        load_scenario(file.path()),
        Err(LoadError::Siege(siege_core::error::SiegeError::UnknownSquad(4)))
    ));
}
