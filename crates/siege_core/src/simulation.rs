//! Attack session context and tick loop.
//!
//! [`Simulation`] owns every deployed entity in typed arenas and runs the
//! systems in a fixed order each tick. Entities refer to each other by
//! [`EntityId`]; a removed id simply stops resolving.
//!
//! # Determinism
//!
//! - Fixed-point math only (see [`Fixed`])
//! - Randomness comes from a `ChaCha8Rng` seeded by the config
//! - Every system walks its arena in ascending id order
//!
//! # Example
//!
//! ```
//! use siege_core::data::CombatConfig;
//! use siege_core::roster::Roster;
//! use siege_core::simulation::{SessionPhase, Simulation};
//!
//! let mut sim = Simulation::with_defaults(CombatConfig::default(), Roster::new());
//! assert_eq!(sim.phase(), SessionPhase::Idle);
//! let events = sim.tick(siege_core::math::Fixed::from_num(0.05));
//! assert!(events.events.is_empty());
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, warn};

use crate::buildings::{BuildSite, Constructible, SiteVariant};
use crate::combat::{Combatant, DamageOutcome, Damageable, Targeting};
use crate::components::{EntityId, Health, RangeKind, SpeedFactor};
use crate::data::{CombatConfig, ScenarioData};
use crate::error::{Result, SiegeError};
use crate::events::{Channel, DeathWatch, GameEvent, Notifications, SubscriptionId, TickEvents};
use crate::hostiles::{Enemy, Tower};
use crate::math::{Fixed, Vec2Fixed};
use crate::navigation::{GridTerrain, IndicatorBridge, Mover, NoIndicators, StraightLineMover, Terrain};
use crate::roster::{DayReport, Roster};
use crate::soldier_unit::SoldierUnit;
use crate::squad_unit::{DestinationClaims, SquadState, SquadUnit};
use crate::turret::Turret;

/// Id-keyed storage for one entity kind.
///
/// Uses a `HashMap` for O(1) lookup, with deterministic iteration via
/// sorted keys when processing systems.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: HashMap<EntityId, T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { items: HashMap::new() }
    }
}

impl<T> Arena<T> {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an item.
    pub fn insert(&mut self, id: EntityId, item: T) {
        self.items.insert(id, item);
    }

    /// Remove an item.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        self.items.remove(&id)
    }

    /// Item by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.items.get(&id)
    }

    /// Mutable item by id.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.items.get_mut(&id)
    }

    /// Check if an item exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.items.contains_key(&id)
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sorted ids for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.items.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Attack session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionPhase {
    /// Between sessions. Day resolution happens here.
    #[default]
    Idle,
    /// Squads are deployed and systems run.
    Active,
    /// The last squad terminated. Awaiting day resolution.
    Resolved,
}

/// External services a session drives.
pub struct Collaborators {
    /// Movement service.
    pub mover: Box<dyn Mover>,
    /// Terrain service.
    pub terrain: Box<dyn Terrain>,
    /// Progress display service.
    pub indicators: Box<dyn IndicatorBridge>,
}

impl Collaborators {
    /// Reference services on an open grid.
    #[must_use]
    pub fn reference(width: u32, height: u32, cell_size: Fixed) -> Self {
        Self {
            mover: Box::new(StraightLineMover::new()),
            terrain: Box::new(GridTerrain::new(width, height, cell_size)),
            indicators: Box::new(NoIndicators::default()),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Input to [`Simulation::begin_attack`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttackSetup {
    /// Squad spawn points, used round-robin.
    pub spawn_points: Vec<Vec2Fixed>,
}

/// An attack session and the persistent state around it.
///
/// # System Execution Order
///
/// Each active tick, systems run in this order:
/// 1. **Sites** - construction progress and explosive countdowns
/// 2. **Turrets** - activation, aiming and firing
/// 3. **Hostiles** - towers, then enemies, fire at soldiers
/// 4. **Squads** - targeting, holding, retreat and formation
/// 5. **Soldiers** - healing, targeting and firing
/// 6. **Movement** - the mover advances every body
pub struct Simulation {
    pub(crate) config: CombatConfig,
    pub(crate) tick: u64,
    pub(crate) phase: SessionPhase,
    pub(crate) roster: Roster,
    pub(crate) headquarters: Option<Vec2Fixed>,
    pub(crate) squad_units: Arena<SquadUnit>,
    pub(crate) soldier_units: Arena<SoldierUnit>,
    pub(crate) turrets: Arena<Turret>,
    pub(crate) towers: Arena<Tower>,
    pub(crate) enemies: Arena<Enemy>,
    pub(crate) sites: Arena<BuildSite>,
    pub(crate) claims: DestinationClaims,
    pub(crate) death_watch: DeathWatch,
    pub(crate) mover: Box<dyn Mover>,
    pub(crate) terrain: Box<dyn Terrain>,
    pub(crate) indicators: Box<dyn IndicatorBridge>,
    pub(crate) notifications: Notifications,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) pending: Vec<GameEvent>,
    dispatched: Vec<GameEvent>,
    next_id: EntityId,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.tick)
            .field("phase", &self.phase)
            .field("squad_units", &self.squad_units.len())
            .field("soldier_units", &self.soldier_units.len())
            .field("towers", &self.towers.len())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Create a simulation around a roster and its services.
    #[must_use]
    pub fn new(config: CombatConfig, roster: Roster, collaborators: Collaborators) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.rng_seed);
        Self {
            config,
            tick: 0,
            phase: SessionPhase::Idle,
            roster,
            headquarters: None,
            squad_units: Arena::new(),
            soldier_units: Arena::new(),
            turrets: Arena::new(),
            towers: Arena::new(),
            enemies: Arena::new(),
            sites: Arena::new(),
            claims: DestinationClaims::new(),
            death_watch: DeathWatch::new(),
            mover: collaborators.mover,
            terrain: collaborators.terrain,
            indicators: collaborators.indicators,
            notifications: Notifications::new(),
            rng,
            pending: Vec::new(),
            dispatched: Vec::new(),
            next_id: 1,
        }
    }

    /// Create a simulation on a 64x64 reference grid.
    #[must_use]
    pub fn with_defaults(config: CombatConfig, roster: Roster) -> Self {
        let cell_size = config.cell_size;
        Self::new(config, roster, Collaborators::reference(64, 64, cell_size))
    }

    /// Build a simulation from scenario data.
    ///
    /// Towers, enemies and sites are placed. The returned setup carries
    /// the spawn points for [`begin_attack`](Self::begin_attack).
    pub fn from_scenario(config: CombatConfig, scenario: &ScenarioData) -> Result<(Self, AttackSetup)> {
        config.validate()?;
        scenario.validate()?;

        let cell_size = scenario.grid.cell_size.unwrap_or(config.cell_size);
        let mut terrain = GridTerrain::new(scenario.grid.width, scenario.grid.height, cell_size);
        for cell in &scenario.grid.blocked {
            terrain.block(*cell);
        }

        let rules = config.roster;
        let mut roster = Roster::new();
        for soldier in &scenario.roster.soldiers {
            roster.add_soldier(soldier.clone());
        }
        for squad in &scenario.roster.squads {
            roster.add_squad(squad.clone(), &rules);
        }

        let collaborators = Collaborators {
            mover: Box::new(StraightLineMover::new()),
            terrain: Box::new(terrain),
            indicators: Box::new(NoIndicators::default()),
        };
        let mut sim = Self::new(config, roster, collaborators);
        sim.headquarters = scenario.headquarters;

        let mut tower_ids = Vec::with_capacity(scenario.towers.len());
        for tower in &scenario.towers {
            let combatant = Combatant::new(
                0,
                Health::new(tower.max_hp),
                tower.attack,
                tower.defense,
                tower.shooting_period,
            );
            tower_ids.push(sim.add_tower(tower.position, combatant, tower.attack_cells.clone()));
        }
        for enemy in &scenario.enemies {
            let combatant = Combatant::new(
                0,
                Health::new(enemy.max_hp),
                enemy.attack,
                enemy.defense,
                enemy.shooting_period,
            );
            let id = sim.add_enemy(enemy.position, combatant);
            sim.mover.set_speed(id, enemy.speed);
            if let Some(destination) = enemy.destination {
                sim.mover.set_destination(id, destination);
            }
        }
        for site in &scenario.sites {
            let target = site.target_tower.and_then(|i| tower_ids.get(i).copied());
            sim.place_site(site.kind, site.position, target);
        }
        sim.flush_commands();

        info!(
            scenario = %scenario.name,
            towers = tower_ids.len(),
            enemies = scenario.enemies.len(),
            "Scenario loaded"
        );
        Ok((
            sim,
            AttackSetup {
                spawn_points: scenario.spawn_points.clone(),
            },
        ))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Session phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// The persistent roster.
    #[must_use]
    pub const fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Mutable roster. Only available between sessions.
    pub fn roster_mut(&mut self) -> Result<&mut Roster> {
        if self.phase == SessionPhase::Active {
            return Err(SiegeError::SessionActive);
        }
        Ok(&mut self.roster)
    }

    /// Headquarters position.
    #[must_use]
    pub const fn headquarters(&self) -> Option<Vec2Fixed> {
        self.headquarters
    }

    /// Set the headquarters position.
    pub fn set_headquarters(&mut self, position: Vec2Fixed) {
        self.headquarters = Some(position);
    }

    /// Ids of deployed squad units in ascending order.
    #[must_use]
    pub fn squad_unit_ids(&self) -> Vec<EntityId> {
        self.squad_units.sorted_ids()
    }

    /// Ids of deployed soldier units in ascending order.
    #[must_use]
    pub fn soldier_unit_ids(&self) -> Vec<EntityId> {
        self.soldier_units.sorted_ids()
    }

    /// Ids of standing towers in ascending order.
    #[must_use]
    pub fn tower_ids(&self) -> Vec<EntityId> {
        self.towers.sorted_ids()
    }

    /// Ids of turrets in ascending order.
    #[must_use]
    pub fn turret_ids(&self) -> Vec<EntityId> {
        self.turrets.sorted_ids()
    }

    /// Ids of construction sites in ascending order.
    #[must_use]
    pub fn site_ids(&self) -> Vec<EntityId> {
        self.sites.sorted_ids()
    }

    /// Movement service.
    #[must_use]
    pub fn mover(&self) -> &dyn Mover {
        self.mover.as_ref()
    }

    /// Mutable movement service, for scripting enemies.
    pub fn mover_mut(&mut self) -> &mut dyn Mover {
        self.mover.as_mut()
    }

    /// Terrain service.
    #[must_use]
    pub fn terrain(&self) -> &dyn Terrain {
        self.terrain.as_ref()
    }

    /// World position of any entity.
    #[must_use]
    pub fn position_of(&self, id: EntityId) -> Option<Vec2Fixed> {
        if let Some(tower) = self.towers.get(id) {
            return Some(tower.position);
        }
        if let Some(turret) = self.turrets.get(id) {
            return Some(turret.position);
        }
        if let Some(site) = self.sites.get(id) {
            return Some(site.position);
        }
        self.mover.position(id)
    }

    /// Target currently held by any targeting entity.
    #[must_use]
    pub fn target_of(&self, holder: EntityId) -> Option<EntityId> {
        if let Some(unit) = self.squad_units.get(holder) {
            return unit.current_target();
        }
        if let Some(unit) = self.soldier_units.get(holder) {
            return unit.current_target();
        }
        if let Some(turret) = self.turrets.get(holder) {
            return turret.current_target();
        }
        if let Some(tower) = self.towers.get(holder) {
            return tower.current_target();
        }
        self.enemies.get(holder).and_then(|enemy| enemy.current_target())
    }

    /// Subscribe to a notification channel.
    ///
    /// Handlers run when the current command or tick finishes, in the
    /// order events were raised. The same events are also returned in
    /// the next [`TickEvents`].
    pub fn subscribe<F>(&mut self, channel: Channel, handler: F) -> SubscriptionId
    where
        F: FnMut(&GameEvent) + 'static,
    {
        self.notifications.subscribe(channel, handler)
    }

    /// Drop a subscription.
    pub fn unsubscribe(&mut self, channel: Channel, id: SubscriptionId) -> bool {
        self.notifications.unsubscribe(channel, id)
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Deploy every engaged roster squad.
    ///
    /// Squads spawn round-robin on the walkable spawn points. Their
    /// soldiers take roster HP and effective stats. Idle construction
    /// sites resume and turrets come online next tick.
    ///
    /// # Errors
    ///
    /// Fails without deploying anything if a session is running, no
    /// headquarters is set, no spawn point is walkable or no squad is
    /// engaged.
    pub fn begin_attack(&mut self, setup: &AttackSetup) -> Result<Vec<EntityId>> {
        if self.phase == SessionPhase::Active {
            return Err(SiegeError::SessionActive);
        }
        if self.headquarters.is_none() {
            error!("Attack started without a headquarters");
            return Err(SiegeError::MissingHeadquarters);
        }
        let spawns: Vec<Vec2Fixed> = setup
            .spawn_points
            .iter()
            .map(|p| self.terrain.snap_to_grid(*p))
            .filter(|p| self.terrain.is_walkable(self.terrain.cell_of(*p)))
            .collect();
        if spawns.is_empty() {
            error!(points = setup.spawn_points.len(), "No walkable spawn cell");
            return Err(SiegeError::NoSpawnCells);
        }
        let engaged = self.roster.engaged_squads();
        if engaged.is_empty() {
            return Err(SiegeError::NoEngagedSquads);
        }

        let rules = self.config.roster;
        let radii = self.config.radii;
        let mut deployed = Vec::with_capacity(engaged.len());

        for (index, squad_id) in engaged.into_iter().enumerate() {
            self.roster.recompute(squad_id, &rules);
            let Some(squad) = self.roster.squad(squad_id).cloned() else {
                continue;
            };
            let stats = squad.stats();
            let spawn = spawns[index % spawns.len()];

            let mut members = Vec::with_capacity(squad.member_count());
            let mut soldiers = Vec::with_capacity(squad.member_count());
            for (slot, soldier_id) in squad.members() {
                let Some(soldier) = self.roster.soldier(soldier_id) else {
                    continue;
                };
                if !soldier.is_alive() || soldier.current_hp <= Fixed::ZERO {
                    continue;
                }
                let (attack, defense) = self.roster.effective_profiles(soldier_id, &rules)?;
                soldiers.push((slot, soldier.clone(), attack, defense));
            }
            if soldiers.is_empty() {
                warn!(%squad_id, "Engaged squad has no soldier fit to deploy");
                continue;
            }

            let deployed_soldiers: Vec<_> = soldiers.iter().map(|(_, soldier, _, _)| soldier.id).collect();
            self.roster.mark_deployed(&deployed_soldiers);

            let unit_id = self.allocate_id();
            for (slot, soldier, attack, defense) in soldiers {
                let id = self.allocate_id();
                let health = Health::with_current(soldier.current_hp, soldier.max_hp);
                let combatant = Combatant::new(id, health, attack, defense, soldier.class.shooting_period());
                let unit = SoldierUnit {
                    id,
                    soldier: soldier.id,
                    squad: unit_id,
                    slot,
                    combatant,
                    facing: Vec2Fixed::FORWARD,
                    wounded: false,
                    speed_base: soldier.speed,
                    speed_factor: SpeedFactor::ONE,
                    capabilities: soldier.capabilities,
                    is_building_this_tick: false,
                    damage_dealt: Fixed::ZERO,
                };
                self.mover
                    .place(id, spawn + squad.formation.offset(slot).local_to_world(Vec2Fixed::FORWARD));
                self.soldier_units.insert(id, unit);
                members.push(id);
            }

            let unit = SquadUnit {
                id: unit_id,
                squad: squad_id,
                members,
                target: None,
                protection_stance: false,
                retreat_active: false,
                fixed_destination: None,
                facing: Vec2Fixed::FORWARD,
                formation: squad.formation,
                preferred_range: squad.preferred_range(),
                max_stop_range: squad.max_stop_range(&radii),
                speed_base: stats.speed,
                speed_factor: SpeedFactor::ONE,
                state: SquadState::Seeking,
                selected: false,
            };
            self.mover.place(unit_id, spawn);
            self.squad_units.insert(unit_id, unit);
            self.refresh_speeds(unit_id);
            debug!(squad = unit_id, %squad_id, "Squad deployed");
            deployed.push(unit_id);
        }

        if deployed.is_empty() {
            return Err(SiegeError::NoEngagedSquads);
        }

        for id in self.sites.sorted_ids() {
            if let Some(site) = self.sites.get_mut(id) {
                let resumable = !site.buildable().is_building() && !site.is_armed();
                if resumable {
                    let anchor = site.position;
                    site.buildable_mut().start_building(anchor, self.indicators.as_mut());
                }
            }
        }
        self.schedule_turret_activation();

        self.phase = SessionPhase::Active;
        info!(tick = self.tick, squads = deployed.len(), "Attack session started");
        self.flush_commands();
        Ok(deployed)
    }

    /// Advance the session by `dt` seconds.
    ///
    /// Systems only run while a session is active. Events emitted by
    /// commands since the last tick are included in the result.
    pub fn tick(&mut self, dt: Fixed) -> TickEvents {
        if self.phase == SessionPhase::Active {
            self.run_site_system(dt);
            self.run_turret_system(dt);
            self.run_hostile_system(dt);
            self.run_squad_system(dt);
            self.run_soldier_system(dt);
            self.mover.advance(dt);
            self.tick += 1;

            #[cfg(feature = "debug-validation")]
            self.validate_state();

            debug!(tick = self.tick, hash = self.state_hash(), "Tick complete");
        }
        self.flush()
    }

    /// Resolve the day between sessions.
    ///
    /// Every explosive charge goes off, finished or not. Other unfinished
    /// sites stop. Turrets go to sleep and lose a day of service, then the
    /// roster resolves deaths and rest.
    ///
    /// # Errors
    ///
    /// Returns [`SiegeError::SessionActive`] while squads are deployed.
    pub fn end_day(&mut self) -> Result<DayReport> {
        if self.phase == SessionPhase::Active {
            return Err(SiegeError::SessionActive);
        }

        let mut detonated = Vec::new();
        for id in self.sites.sorted_ids() {
            let Some(site) = self.sites.get(id) else {
                continue;
            };
            if matches!(site.variant, SiteVariant::Explosives(_)) {
                self.detonate_charge(id);
                detonated.push(id);
            } else if site.buildable().is_building() {
                self.cancel_site(id);
            }
        }

        self.deactivate_turrets();
        let expired_turrets = self.expire_turrets();

        let rules = self.config.roster;
        let mut report = self.roster.end_day(&rules);
        report.detonated = detonated;
        report.expired_turrets = expired_turrets;

        self.phase = SessionPhase::Idle;
        info!(day = report.day, deaths = report.deaths.len(), "Day resolved");
        self.flush_commands();
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Internals shared by the systems
    // ------------------------------------------------------------------

    pub(crate) fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn emit(&mut self, event: GameEvent) {
        self.pending.push(event);
    }

    /// Dispatch queued events now. They are reported with the next tick.
    pub(crate) fn flush_commands(&mut self) {
        let events = std::mem::take(&mut self.pending);
        for event in &events {
            self.notifications.dispatch(event);
        }
        self.dispatched.extend(events);
    }

    fn flush(&mut self) -> TickEvents {
        self.flush_commands();
        TickEvents {
            tick: self.tick,
            events: std::mem::take(&mut self.dispatched),
        }
    }

    fn damageable_mut(&mut self, id: EntityId) -> Option<&mut dyn Damageable> {
        if let Some(unit) = self.soldier_units.get_mut(id) {
            return Some(unit);
        }
        if let Some(tower) = self.towers.get_mut(id) {
            return Some(tower);
        }
        if let Some(enemy) = self.enemies.get_mut(id) {
            return Some(enemy);
        }
        if let Some(turret) = self.turrets.get_mut(id) {
            return Some(turret);
        }
        None
    }

    /// Apply a hit to any damageable entity and propagate a knock-down.
    pub(crate) fn damage_entity(&mut self, target: EntityId, amount: Fixed, kind: RangeKind) -> DamageOutcome {
        let model = self.config.defense_model;
        let mut events = std::mem::take(&mut self.pending);
        let outcome = match self.damageable_mut(target) {
            Some(entity) => entity.combatant_mut().apply_damage(amount, kind, model, &mut events),
            None => DamageOutcome::default(),
        };
        self.pending = events;

        if outcome.went_down {
            self.handle_down(target);
        }
        outcome
    }

    /// Emit a shot and apply it.
    pub(crate) fn deliver_hit(&mut self, shooter: EntityId, target: EntityId, kind: RangeKind, amount: Fixed) -> DamageOutcome {
        self.emit(GameEvent::Fired {
            shooter,
            target,
            range: kind,
            damage: amount,
        });
        self.damage_entity(target, amount, kind)
    }

    pub(crate) fn notify_target_lost(&mut self, holder: EntityId, target: EntityId) {
        let events = &mut self.pending;
        if let Some(unit) = self.squad_units.get_mut(holder) {
            unit.target_lost(target, events);
        } else if let Some(unit) = self.soldier_units.get_mut(holder) {
            unit.target_lost(target, events);
        } else if let Some(turret) = self.turrets.get_mut(holder) {
            turret.target_lost(target, events);
        } else if let Some(tower) = self.towers.get_mut(holder) {
            tower.target_lost(target, events);
        } else if let Some(enemy) = self.enemies.get_mut(holder) {
            enemy.target_lost(target, events);
        }
    }

    /// Clear every watcher of a downed entity, then apply its kind's rule.
    fn handle_down(&mut self, id: EntityId) {
        for holder in self.death_watch.take_watchers(id) {
            self.notify_target_lost(holder, id);
        }

        if self.soldier_units.contains(id) {
            self.soldier_down(id);
        } else if self.towers.contains(id) {
            self.remove_tower(id);
        } else if self.enemies.contains(id) {
            self.remove_enemy(id);
        } else if self.turrets.contains(id) {
            info!(turret = id, "Turret destroyed");
            self.remove_turret(id);
        }
    }

    /// Hash of the simulation state for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.phase.hash(&mut hasher);
        self.headquarters.hash(&mut hasher);

        hash_arena(&self.squad_units, &mut hasher);
        hash_arena(&self.soldier_units, &mut hasher);
        hash_arena(&self.turrets, &mut hasher);
        hash_arena(&self.towers, &mut hasher);
        hash_arena(&self.enemies, &mut hasher);
        hash_arena(&self.sites, &mut hasher);
        self.claims.hash(&mut hasher);

        // Positions live in the mover
        for id in self
            .squad_units
            .sorted_ids()
            .into_iter()
            .chain(self.soldier_units.sorted_ids())
            .chain(self.enemies.sorted_ids())
        {
            self.mover.position(id).hash(&mut hasher);
        }

        hasher.finish()
    }

    #[cfg(feature = "debug-validation")]
    fn validate_state(&self) {
        for id in self.squad_units.sorted_ids() {
            if let Some(unit) = self.squad_units.get(id) {
                debug_assert!(!unit.state.is_terminal(), "terminal squad {id} left in arena");
                debug_assert!(
                    unit.members.iter().all(|m| self.soldier_units.contains(*m)),
                    "squad {id} lists a removed soldier"
                );
            }
        }
        for id in self.sites.sorted_ids() {
            if let Some(site) = self.sites.get(id) {
                debug_assert!(site.buildable.progress() <= site.buildable.duration());
                if let SiteVariant::Explosives(charge) = site.variant {
                    debug_assert!(charge.countdown.map_or(true, |c| c > Fixed::ZERO));
                }
            }
        }
    }
}

fn hash_arena<T: Hash>(arena: &Arena<T>, hasher: &mut DefaultHasher) {
    let ids = arena.sorted_ids();
    ids.len().hash(hasher);
    for id in ids {
        id.hash(hasher);
        if let Some(item) = arena.get(id) {
            item.hash(hasher);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::components::{RangeProfile, SoldierId, SquadId};
    use crate::roster::Soldier;
    use crate::squad::Squad;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn vec2(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    fn roster_with_squad(engaged: bool) -> Roster {
        let rules = CombatConfig::default().roster;
        let mut roster = Roster::new();
        let mut squad = Squad::new(SquadId(1), "Alpha");
        squad.engaged = engaged;
        for n in 1..=4 {
            roster.add_soldier(Soldier::new(
                SoldierId(n),
                format!("S{n}"),
                fixed(40),
                RangeProfile::from_ints(8, 6, 4, 0),
                RangeProfile::from_ints(1, 1, 1, 0),
                fixed(4),
            ));
            squad.slots[(n - 1) as usize] = Some(SoldierId(n));
        }
        roster.add_squad(squad, &rules);
        roster
    }

    fn setup() -> AttackSetup {
        AttackSetup {
            spawn_points: vec![vec2(9, 9)],
        }
    }

    #[test]
    fn test_arena_sorted_ids() {
        let mut arena = Arena::new();
        arena.insert(7, "c");
        arena.insert(2, "a");
        arena.insert(5, "b");
        assert_eq!(arena.sorted_ids(), vec![2, 5, 7]);
        assert_eq!(arena.remove(5), Some("b"));
        assert!(!arena.contains(5));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_begin_attack_requires_headquarters() {
        let mut sim = Simulation::with_defaults(CombatConfig::default(), roster_with_squad(true));
        assert_eq!(sim.begin_attack(&setup()), Err(SiegeError::MissingHeadquarters));
        assert_eq!(sim.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_begin_attack_requires_spawn_cells() {
        let mut sim = Simulation::with_defaults(CombatConfig::default(), roster_with_squad(true));
        sim.set_headquarters(vec2(1, 1));
        let outside = AttackSetup {
            spawn_points: vec![vec2(-50, -50)],
        };
        assert_eq!(sim.begin_attack(&outside), Err(SiegeError::NoSpawnCells));
    }

    #[test]
    fn test_begin_attack_requires_engaged_squad() {
        let mut sim = Simulation::with_defaults(CombatConfig::default(), roster_with_squad(false));
        sim.set_headquarters(vec2(1, 1));
        assert_eq!(sim.begin_attack(&setup()), Err(SiegeError::NoEngagedSquads));
    }

    #[test]
    fn test_begin_attack_deploys_squad() {
        let mut sim = Simulation::with_defaults(CombatConfig::default(), roster_with_squad(true));
        sim.set_headquarters(vec2(1, 1));

        let deployed = sim.begin_attack(&setup()).expect("deploys");
        assert_eq!(deployed.len(), 1);
        assert_eq!(sim.phase(), SessionPhase::Active);

        let unit = sim.squad_unit(deployed[0]).expect("squad unit");
        assert_eq!(unit.members.len(), 4);
        for member in &unit.members {
            let soldier = sim.soldier_unit(*member).expect("soldier unit");
            assert_eq!(soldier.combatant.health.current, fixed(40));
        }
        assert_eq!(sim.begin_attack(&setup()), Err(SiegeError::SessionActive));
        assert_eq!(sim.end_day(), Err(SiegeError::SessionActive));
    }

    #[test]
    fn test_idle_tick_does_not_advance() {
        let mut sim = Simulation::with_defaults(CombatConfig::default(), Roster::new());
        let events = sim.tick(Fixed::ONE);
        assert_eq!(events.tick, 0);
        assert_eq!(sim.get_tick(), 0);
    }

    #[test]
    fn test_retreat_to_hq_resolves_session() {
        let mut sim = Simulation::with_defaults(CombatConfig::default(), roster_with_squad(true));
        sim.set_headquarters(vec2(1, 1));
        let squad = sim.begin_attack(&setup()).expect("deploys")[0];

        // Spawn is within the arrival radius of the headquarters
        sim.retreat(squad).expect("retreats");
        let events = sim.tick(Fixed::from_num(0.1));
        assert!(events.session_resolved());
        assert_eq!(events.count(Channel::UnitReturnedToHq), 1);
        assert_eq!(sim.phase(), SessionPhase::Resolved);
        assert!(sim.squad_unit(squad).is_none());
        assert!(!sim.roster().squad(SquadId(1)).expect("squad").engaged);

        let report = sim.end_day().expect("day resolves");
        assert_eq!(report.day, 1);
        assert_eq!(sim.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_deployed_soldiers_stay_engaged_until_they_return() {
        let mut sim = Simulation::with_defaults(CombatConfig::default(), roster_with_squad(true));
        sim.set_headquarters(vec2(1, 1));
        let squad = sim.begin_attack(&setup()).expect("deploys")[0];
        let engaged = |sim: &Simulation, n| sim.roster().soldier(SoldierId(n)).is_some_and(|s| s.engaged);
        assert!((1..=4).all(|n| engaged(&sim, n)));

        sim.retreat(squad).expect("retreats");
        sim.tick(Fixed::from_num(0.1));
        assert!((1..=4).all(|n| !engaged(&sim, n)));
    }

    #[test]
    fn test_subscribers_run_at_flush_in_raised_order() {
        let mut sim = Simulation::with_defaults(CombatConfig::default(), Roster::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        sim.subscribe(Channel::EntityRemoved, move |event| log.borrow_mut().push(event.clone()));

        sim.emit(GameEvent::EntityRemoved { entity: 7 });
        sim.emit(GameEvent::EntityRemoved { entity: 3 });
        assert!(seen.borrow().is_empty());

        sim.flush_commands();
        assert_eq!(
            *seen.borrow(),
            vec![GameEvent::EntityRemoved { entity: 7 }, GameEvent::EntityRemoved { entity: 3 }]
        );
        // Reported again with the next tick, without a second dispatch
        let events = sim.tick(Fixed::from_num(0.1));
        assert_eq!(events.count(Channel::EntityRemoved), 2);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_state_hash_tracks_state() {
        let build = || {
            let mut sim = Simulation::with_defaults(CombatConfig::default(), roster_with_squad(true));
            sim.set_headquarters(vec2(1, 1));
            sim.begin_attack(&setup()).expect("deploys");
            sim
        };
        let mut a = build();
        let mut b = build();
        assert_eq!(a.state_hash(), b.state_hash());

        a.tick(Fixed::from_num(0.1));
        assert_ne!(a.state_hash(), b.state_hash());
        b.tick(Fixed::from_num(0.1));
        assert_eq!(a.state_hash(), b.state_hash());
    }
}
