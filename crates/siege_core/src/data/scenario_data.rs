//! Scenario data: the map, the hostiles and the roster of one attack.

use serde::{Deserialize, Serialize};

use crate::buildings::SiteKind;
use crate::components::{RangeProfile, SquadId};
use crate::error::{Result, SiegeError};
use crate::hostiles::AttackCells;
use crate::math::{decimal_serde, Fixed, Vec2Fixed};
use crate::navigation::GridCell;
use crate::roster::Soldier;
use crate::squad::Squad;

/// Terrain grid layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridData {
    /// Cells along x.
    pub width: u32,
    /// Cells along y.
    pub height: u32,
    /// Cell edge length. Falls back to the config's cell size.
    #[serde(default, with = "optional_decimal")]
    pub cell_size: Option<Fixed>,
    /// Unwalkable, sight-blocking cells.
    #[serde(default)]
    pub blocked: Vec<GridCell>,
}

impl Default for GridData {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            cell_size: None,
            blocked: Vec::new(),
        }
    }
}

/// A tower and its combat stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TowerData {
    /// World position.
    pub position: Vec2Fixed,
    /// Maximum HP.
    #[serde(with = "decimal_serde")]
    pub max_hp: Fixed,
    /// Attack per range.
    #[serde(default)]
    pub attack: RangeProfile,
    /// Defense per range.
    #[serde(default)]
    pub defense: RangeProfile,
    /// Seconds between shots.
    #[serde(default = "one", with = "decimal_serde")]
    pub shooting_period: Fixed,
    /// Explicit attack cells. Generated from the terrain when absent.
    #[serde(default)]
    pub attack_cells: Option<AttackCells>,
}

/// A mobile enemy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyData {
    /// Starting position.
    pub position: Vec2Fixed,
    /// Maximum HP.
    #[serde(with = "decimal_serde")]
    pub max_hp: Fixed,
    /// Attack per range.
    #[serde(default)]
    pub attack: RangeProfile,
    /// Defense per range.
    #[serde(default)]
    pub defense: RangeProfile,
    /// Seconds between shots.
    #[serde(default = "one", with = "decimal_serde")]
    pub shooting_period: Fixed,
    /// Movement speed.
    #[serde(default = "one", with = "decimal_serde")]
    pub speed: Fixed,
    /// Point the enemy walks to once the session starts.
    #[serde(default)]
    pub destination: Option<Vec2Fixed>,
}

/// A construction site placed before the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteData {
    /// Site kind.
    pub kind: SiteKind,
    /// World position.
    pub position: Vec2Fixed,
    /// Index into the scenario's towers for explosive charges.
    #[serde(default)]
    pub target_tower: Option<usize>,
}

/// Soldiers and squads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterData {
    /// Every soldier.
    #[serde(default)]
    pub soldiers: Vec<Soldier>,
    /// Every squad. Engaged squads deploy.
    #[serde(default)]
    pub squads: Vec<Squad>,
}

/// A scripted command issued at a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    /// Send a squad against a tower, by index into the scenario's towers.
    Attack {
        /// Roster squad.
        squad: SquadId,
        /// Tower index.
        tower: usize,
        /// Tick the order is issued at.
        #[serde(default)]
        at_tick: u64,
    },
    /// Send a squad back to headquarters.
    Retreat {
        /// Roster squad.
        squad: SquadId,
        /// Tick the order is issued at.
        #[serde(default)]
        at_tick: u64,
    },
}

impl Order {
    /// Tick the order is issued at.
    #[must_use]
    pub const fn at_tick(&self) -> u64 {
        match self {
            Order::Attack { at_tick, .. } | Order::Retreat { at_tick, .. } => *at_tick,
        }
    }

    /// Squad the order is for.
    #[must_use]
    pub const fn squad(&self) -> SquadId {
        match self {
            Order::Attack { squad, .. } | Order::Retreat { squad, .. } => *squad,
        }
    }
}

/// A complete attack scenario.
///
/// # Example RON
///
/// ```ron
/// ScenarioData(
///     name: "outpost",
///     headquarters: Some((x: 3.0, y: 3.0)),
///     spawn_points: [(x: 5.0, y: 5.0)],
///     towers: [
///         TowerData(position: (x: 41.0, y: 41.0), max_hp: 120.0,
///                   attack: (short: 6.0, middle: 4.0, long: 2.0)),
///     ],
///     roster: RosterData(soldiers: [...], squads: [...]),
///     orders: [Attack(squad: (1), tower: 0)],
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioData {
    /// Scenario name.
    #[serde(default)]
    pub name: String,
    /// Headquarters position squads retreat to.
    #[serde(default)]
    pub headquarters: Option<Vec2Fixed>,
    /// Squad spawn points, used round-robin.
    #[serde(default)]
    pub spawn_points: Vec<Vec2Fixed>,
    /// Terrain grid.
    #[serde(default)]
    pub grid: GridData,
    /// Enemy towers.
    #[serde(default)]
    pub towers: Vec<TowerData>,
    /// Mobile enemies.
    #[serde(default)]
    pub enemies: Vec<EnemyData>,
    /// Construction sites.
    #[serde(default)]
    pub sites: Vec<SiteData>,
    /// Soldiers and squads.
    #[serde(default)]
    pub roster: RosterData,
    /// Scripted orders.
    #[serde(default)]
    pub orders: Vec<Order>,
}

impl ScenarioData {
    /// Parse a RON scenario and validate its references.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let scenario: Self = ron::from_str(text).map_err(|e| SiegeError::ConfigParse(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check that tower and squad references resolve.
    pub fn validate(&self) -> Result<()> {
        for site in &self.sites {
            if let Some(index) = site.target_tower {
                if index >= self.towers.len() {
                    return Err(SiegeError::ConfigParse(format!("site targets missing tower {index}")));
                }
            }
        }
        for order in &self.orders {
            let squad = order.squad();
            if !self.roster.squads.iter().any(|s| s.id == squad) {
                return Err(SiegeError::UnknownSquad(squad.0));
            }
            if let Order::Attack { tower, .. } = order {
                if *tower >= self.towers.len() {
                    return Err(SiegeError::ConfigParse(format!("order targets missing tower {tower}")));
                }
            }
        }
        for squad in &self.roster.squads {
            for (_, soldier) in squad.members() {
                if !self.roster.soldiers.iter().any(|s| s.id == soldier) {
                    return Err(SiegeError::UnknownSoldier(soldier.0));
                }
            }
        }
        Ok(())
    }

    /// Orders sorted by issue tick, stable for equal ticks.
    #[must_use]
    pub fn orders_by_tick(&self) -> Vec<Order> {
        let mut orders = self.orders.clone();
        orders.sort_by_key(Order::at_tick);
        orders
    }
}

fn one() -> Fixed {
    Fixed::ONE
}

mod optional_decimal {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::math::Fixed;

    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(|v| v.to_num::<f64>()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<f64>::deserialize(deserializer)?;
        value
            .map(|v| Fixed::checked_from_num(v).ok_or_else(|| serde::de::Error::custom("value out of range")))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
        ScenarioData(
            name: "outpost",
            headquarters: Some((x: 3.0, y: 3.0)),
            spawn_points: [(x: 5.0, y: 5.0)],
            grid: GridData(width: 32, height: 32, blocked: [(x: 10, y: 10)]),
            towers: [
                TowerData(
                    position: (x: 41.0, y: 41.0),
                    max_hp: 120.0,
                    attack: (short: 6.0, middle: 4.0, long: 2.0),
                ),
            ],
            roster: RosterData(
                soldiers: [
                    Soldier(
                        id: (1),
                        name: "Ada",
                        max_hp: 50.0,
                        current_hp: 50.0,
                        attack: (short: 8.0, middle: 5.0, long: 3.0),
                        speed: 4.0,
                    ),
                ],
                squads: [
                    Squad(id: (1), name: "Alpha", slots: [Some((1)), None, None, None], engaged: true),
                ],
            ),
            orders: [Attack(squad: (1), tower: 0, at_tick: 2)],
        )
    "#;

    #[test]
    fn test_parse_scenario() {
        let scenario = ScenarioData::from_ron_str(SCENARIO).expect("scenario parses");
        assert_eq!(scenario.name, "outpost");
        assert_eq!(scenario.grid.width, 32);
        assert_eq!(scenario.grid.cell_size, None);
        assert_eq!(scenario.grid.blocked, vec![GridCell::new(10, 10)]);
        assert_eq!(scenario.towers[0].max_hp, Fixed::from_num(120));
        assert_eq!(scenario.towers[0].shooting_period, Fixed::ONE);
        assert!(scenario.towers[0].attack_cells.is_none());
        assert_eq!(scenario.roster.soldiers[0].level, 1);
        assert!(scenario.roster.squads[0].engaged);
        assert_eq!(scenario.orders[0].at_tick(), 2);
    }

    #[test]
    fn test_order_for_unknown_squad_rejected() {
        let text = SCENARIO.replace("Attack(squad: (1)", "Attack(squad: (9)");
        assert_eq!(ScenarioData::from_ron_str(&text), Err(SiegeError::UnknownSquad(9)));
    }

    #[test]
    fn test_missing_tower_rejected() {
        let text = SCENARIO.replace("tower: 0", "tower: 3");
        assert!(matches!(
            ScenarioData::from_ron_str(&text),
            Err(SiegeError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_orders_sorted_stably() {
        let squad = SquadId(1);
        let scenario = ScenarioData {
            orders: vec![
                Order::Retreat { squad, at_tick: 9 },
                Order::Attack { squad, tower: 0, at_tick: 1 },
                Order::Retreat { squad, at_tick: 1 },
            ],
            ..ScenarioData::default()
        };
        let ordered = scenario.orders_by_tick();
        assert!(matches!(ordered[0], Order::Attack { .. }));
        assert!(matches!(ordered[1], Order::Retreat { at_tick: 1, .. }));
        assert_eq!(ordered[2].at_tick(), 9);
    }
}
