//! Construction sites: turret bases, explosive charges and headquarters.
//!
//! A [`Buildable`] only advances while a soldier with the site's required
//! capability stands close enough and is not wounded. The site system
//! picks that soldier each tick, flags it as building and hands the
//! completion to the site's kind:
//!
//! - **Turret base**: spawns an inactive turret that comes online next tick
//! - **Explosives**: arms a countdown, then detonates
//! - **Headquarters**: moves the retreat point

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::components::{Capabilities, EntityId, RangeKind};
use crate::events::GameEvent;
use crate::math::{Fixed, Vec2Fixed};
use crate::navigation::{IndicatorBridge, IndicatorHandle};
use crate::range::nearest_of_capability;
use crate::simulation::Simulation;

// ============================================================================
// Buildable
// ============================================================================

/// Construction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BuildState {
    /// Not started or cancelled.
    #[default]
    Idle,
    /// In progress.
    Building,
    /// Finished.
    Complete,
}

/// Result of one construction tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    /// Not building.
    Inactive,
    /// No eligible builder in reach.
    Stalled,
    /// Progress advanced.
    Progressed {
        /// Percent complete, 0-100.
        percent: Fixed,
    },
    /// Construction just finished.
    Completed,
}

/// Construction progress of one site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Buildable {
    state: BuildState,
    duration: Fixed,
    progress: Fixed,
    indicator: Option<IndicatorHandle>,
    assigned_builder: Option<EntityId>,
}

impl Buildable {
    /// Create an idle buildable. Non-positive durations are raised to one tick's worth.
    #[must_use]
    pub fn new(duration: Fixed) -> Self {
        Self {
            state: BuildState::Idle,
            duration: duration.max(Fixed::DELTA),
            progress: Fixed::ZERO,
            indicator: None,
            assigned_builder: None,
        }
    }

    /// Construction state.
    #[must_use]
    pub const fn state(&self) -> BuildState {
        self.state
    }

    /// Check whether construction is running.
    #[must_use]
    pub fn is_building(&self) -> bool {
        self.state == BuildState::Building
    }

    /// Seconds of work needed.
    #[must_use]
    pub const fn duration(&self) -> Fixed {
        self.duration
    }

    /// Seconds of work done.
    #[must_use]
    pub const fn progress(&self) -> Fixed {
        self.progress
    }

    /// Builder who contributed the last progress.
    #[must_use]
    pub const fn assigned_builder(&self) -> Option<EntityId> {
        self.assigned_builder
    }

    /// Progress display handle.
    #[must_use]
    pub const fn indicator(&self) -> Option<IndicatorHandle> {
        self.indicator
    }

    /// Percent complete, capped at 100.
    #[must_use]
    pub fn percent(&self) -> Fixed {
        (Fixed::from_num(100) * self.progress / self.duration).min(Fixed::from_num(100))
    }

    /// Start from zero and show a progress indicator.
    pub fn start_building(&mut self, anchor: Vec2Fixed, indicators: &mut dyn IndicatorBridge) {
        if let Some(old) = self.indicator.take() {
            indicators.remove_indicator(old);
        }
        self.state = BuildState::Building;
        self.progress = Fixed::ZERO;
        self.assigned_builder = None;
        self.indicator = Some(indicators.create_indicator(anchor));
    }

    /// Advance by `dt` if a builder is present.
    ///
    /// Without a builder the progress is left as is; it never regresses.
    pub fn advance(&mut self, dt: Fixed, builder: Option<EntityId>, indicators: &mut dyn IndicatorBridge) -> BuildStep {
        if self.state != BuildState::Building {
            return BuildStep::Inactive;
        }
        let Some(builder) = builder else {
            return BuildStep::Stalled;
        };

        self.assigned_builder = Some(builder);
        self.progress = (self.progress + dt.max(Fixed::ZERO)).min(self.duration);
        if let Some(handle) = self.indicator {
            indicators.update_indicator(handle, self.percent(), Fixed::from_num(100));
        }

        if self.progress >= self.duration {
            self.finish(BuildState::Complete, indicators);
            BuildStep::Completed
        } else {
            BuildStep::Progressed {
                percent: self.percent(),
            }
        }
    }

    /// Abandon construction and return to idle.
    pub fn cancel_building(&mut self, indicators: &mut dyn IndicatorBridge) {
        if self.state == BuildState::Building {
            self.finish(BuildState::Idle, indicators);
        }
    }

    fn finish(&mut self, state: BuildState, indicators: &mut dyn IndicatorBridge) {
        self.state = state;
        self.progress = Fixed::ZERO;
        self.assigned_builder = None;
        if let Some(handle) = self.indicator.take() {
            indicators.remove_indicator(handle);
        }
    }
}

/// Entities under construction.
pub trait Constructible {
    /// Construction progress.
    fn buildable(&self) -> &Buildable;

    /// Mutable construction progress.
    fn buildable_mut(&mut self) -> &mut Buildable;

    /// Capability a soldier needs to contribute.
    fn required_capability(&self) -> Capabilities;
}

// ============================================================================
// Build Sites
// ============================================================================

/// What a site turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SiteKind {
    /// Becomes a turret.
    TurretBase,
    /// Becomes an armed explosive charge.
    Explosives,
    /// Becomes the new headquarters.
    Headquarters,
}

impl SiteKind {
    /// Capability required to build this kind.
    #[must_use]
    pub const fn required_capability(self) -> Capabilities {
        match self {
            SiteKind::TurretBase => Capabilities::TURRET_BUILD,
            SiteKind::Explosives => Capabilities::EXPLOSIVES,
            SiteKind::Headquarters => Capabilities::HQ_BUILD,
        }
    }
}

/// Explosive charge state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExplosiveCharge {
    /// Tower the charge is planted against.
    pub target: Option<EntityId>,
    /// Seconds until detonation, `None` until armed.
    pub countdown: Option<Fixed>,
}

/// Kind-specific site data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteVariant {
    /// Turret base.
    TurretBase,
    /// Explosive charge.
    Explosives(ExplosiveCharge),
    /// Headquarters.
    Headquarters,
}

impl SiteVariant {
    /// Kind tag.
    #[must_use]
    pub const fn kind(&self) -> SiteKind {
        match self {
            SiteVariant::TurretBase => SiteKind::TurretBase,
            SiteVariant::Explosives(_) => SiteKind::Explosives,
            SiteVariant::Headquarters => SiteKind::Headquarters,
        }
    }
}

/// A placed construction site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildSite {
    /// Entity id.
    pub id: EntityId,
    /// World position.
    pub position: Vec2Fixed,
    /// Construction progress.
    pub buildable: Buildable,
    /// Kind-specific data.
    pub variant: SiteVariant,
}

impl BuildSite {
    /// Check whether the site is an armed charge.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        matches!(self.variant, SiteVariant::Explosives(ExplosiveCharge { countdown: Some(_), .. }))
    }
}

impl Constructible for BuildSite {
    fn buildable(&self) -> &Buildable {
        &self.buildable
    }

    fn buildable_mut(&mut self) -> &mut Buildable {
        &mut self.buildable
    }

    fn required_capability(&self) -> Capabilities {
        self.variant.kind().required_capability()
    }
}

// ============================================================================
// Site System
// ============================================================================

impl Simulation {
    /// Place a construction site. Building starts immediately.
    ///
    /// `target` is the tower an explosive charge will damage; other
    /// kinds ignore it.
    pub fn place_site(&mut self, kind: SiteKind, position: Vec2Fixed, target: Option<EntityId>) -> EntityId {
        let id = self.allocate_id();
        let duration = match kind {
            SiteKind::TurretBase => self.config.turret_build_time,
            SiteKind::Explosives => self.config.explosives_build_time,
            SiteKind::Headquarters => self.config.headquarters_build_time,
        };
        let variant = match kind {
            SiteKind::TurretBase => SiteVariant::TurretBase,
            SiteKind::Explosives => SiteVariant::Explosives(ExplosiveCharge {
                target,
                countdown: None,
            }),
            SiteKind::Headquarters => SiteVariant::Headquarters,
        };

        let mut buildable = Buildable::new(duration);
        buildable.start_building(position, self.indicators.as_mut());
        self.sites.insert(
            id,
            BuildSite {
                id,
                position,
                buildable,
                variant,
            },
        );
        debug!(site = id, ?kind, "Construction site placed");
        id
    }

    /// Construction site by id.
    #[must_use]
    pub fn site(&self, id: EntityId) -> Option<&BuildSite> {
        self.sites.get(id)
    }

    /// Abandon a site's construction.
    pub fn cancel_site(&mut self, id: EntityId) -> bool {
        let Some(site) = self.sites.get_mut(id) else {
            return false;
        };
        site.buildable_mut().cancel_building(self.indicators.as_mut());
        true
    }

    /// Set off an armed or unfinished charge now.
    ///
    /// Returns `false` if the id is not an explosive charge.
    pub fn detonate(&mut self, id: EntityId) -> bool {
        let is_charge = self
            .sites
            .get(id)
            .is_some_and(|site| matches!(site.variant, SiteVariant::Explosives(_)));
        if is_charge {
            self.detonate_charge(id);
        }
        is_charge
    }

    /// Advance every construction site and explosive countdown.
    pub(crate) fn run_site_system(&mut self, dt: Fixed) {
        for id in self.sites.sorted_ids() {
            let Some(site) = self.sites.get(id) else {
                continue;
            };

            if let SiteVariant::Explosives(ExplosiveCharge {
                countdown: Some(remaining),
                ..
            }) = site.variant
            {
                let remaining = remaining - dt;
                if remaining <= Fixed::ZERO {
                    self.detonate_charge(id);
                } else if let Some(site) = self.sites.get_mut(id) {
                    if let SiteVariant::Explosives(charge) = &mut site.variant {
                        charge.countdown = Some(remaining);
                    }
                }
                continue;
            }

            if !site.buildable().is_building() {
                continue;
            }

            let builder = self.find_builder(site.position, site.required_capability());
            let Some(site) = self.sites.get_mut(id) else {
                continue;
            };
            match site.buildable_mut().advance(dt, builder, self.indicators.as_mut()) {
                BuildStep::Inactive | BuildStep::Stalled => {}
                BuildStep::Progressed { percent } => {
                    self.mark_building(builder);
                    self.emit(GameEvent::BuildProgressChanged { site: id, percent });
                }
                BuildStep::Completed => {
                    self.mark_building(builder);
                    self.emit(GameEvent::BuildProgressChanged {
                        site: id,
                        percent: Fixed::from_num(100),
                    });
                    self.complete_site(id);
                }
            }
        }
    }

    /// Nearest soldier with the capability, alive, unwounded and in reach.
    fn find_builder(&self, position: Vec2Fixed, capability: Capabilities) -> Option<EntityId> {
        let candidates = self.soldier_units.sorted_ids().into_iter().filter_map(|id| {
            let unit = self.soldier_units.get(id)?;
            let eligible = unit.capabilities.contains(capability) && !unit.wounded && !unit.combatant.is_down();
            if !eligible {
                return None;
            }
            self.mover.position(id).map(|p| (id, p))
        });
        nearest_of_capability(position, candidates, self.config.builder_radius(), |_| true)
    }

    fn mark_building(&mut self, builder: Option<EntityId>) {
        if let Some(unit) = builder.and_then(|id| self.soldier_units.get_mut(id)) {
            unit.is_building_this_tick = true;
        }
    }

    fn complete_site(&mut self, id: EntityId) {
        let Some(site) = self.sites.get(id) else {
            return;
        };
        let kind = site.variant.kind();
        let position = site.position;
        self.emit(GameEvent::BuildComplete { site: id, kind });
        info!(site = id, ?kind, "Construction complete");

        match kind {
            SiteKind::TurretBase => {
                let turret = self.spawn_turret(position);
                debug!(site = id, turret, "Turret base converted");
                self.remove_site(id);
            }
            SiteKind::Explosives => {
                let countdown = self.config.explosive_countdown;
                if let Some(site) = self.sites.get_mut(id) {
                    if let SiteVariant::Explosives(charge) = &mut site.variant {
                        charge.countdown = Some(countdown);
                    }
                }
            }
            SiteKind::Headquarters => {
                self.headquarters = Some(position);
                info!(x = %position.x, y = %position.y, "Headquarters relocated");
                self.remove_site(id);
            }
        }
    }

    /// Apply a charge's blast and remove it.
    pub(crate) fn detonate_charge(&mut self, id: EntityId) {
        let Some(site) = self.sites.get(id) else {
            return;
        };
        let SiteVariant::Explosives(charge) = site.variant else {
            return;
        };
        let origin = site.position;
        let damage = self.config.explosive_damage;
        let splash_sq = self.config.splash_radius() * self.config.splash_radius();

        // Collect before damaging: deaths remove entities from the arenas
        let mut victims: Vec<EntityId> = Vec::new();
        if let Some(tower) = charge.target.filter(|t| self.towers.contains(*t)) {
            victims.push(tower);
        }
        for unit in self.soldier_units.sorted_ids() {
            let in_blast = self
                .mover
                .position(unit)
                .is_some_and(|p| p.distance_squared(origin) <= splash_sq);
            if in_blast {
                victims.push(unit);
            }
        }
        for enemy in self.enemies.sorted_ids() {
            let in_blast = self
                .mover
                .position(enemy)
                .is_some_and(|p| p.distance_squared(origin) <= splash_sq);
            if in_blast {
                victims.push(enemy);
            }
        }

        self.remove_site(id);
        self.emit(GameEvent::Detonated { site: id });
        info!(site = id, victims = victims.len(), "Charge detonated");

        for victim in victims {
            self.damage_entity(victim, damage, RangeKind::Explosive);
        }
    }

    pub(crate) fn remove_site(&mut self, id: EntityId) {
        if let Some(mut site) = self.sites.remove(id) {
            if let Some(handle) = site.buildable.indicator.take() {
                self.indicators.remove_indicator(handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::NoIndicators;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    #[test]
    fn test_buildable_lifecycle() {
        let mut indicators = NoIndicators::default();
        let mut buildable = Buildable::new(fixed(4));
        assert_eq!(buildable.advance(fixed(1), Some(9), &mut indicators), BuildStep::Inactive);

        buildable.start_building(Vec2Fixed::ZERO, &mut indicators);
        assert!(buildable.indicator().is_some());

        assert_eq!(
            buildable.advance(fixed(1), Some(9), &mut indicators),
            BuildStep::Progressed { percent: fixed(25) }
        );
        assert_eq!(buildable.assigned_builder(), Some(9));

        // No builder: stalls without regressing
        assert_eq!(buildable.advance(fixed(1), None, &mut indicators), BuildStep::Stalled);
        assert_eq!(buildable.progress(), fixed(1));

        assert_eq!(buildable.advance(fixed(10), Some(9), &mut indicators), BuildStep::Completed);
        assert_eq!(buildable.state(), BuildState::Complete);
        assert_eq!(buildable.progress(), Fixed::ZERO);
        assert!(buildable.indicator().is_none());
    }

    #[test]
    fn test_cancel_resets() {
        let mut indicators = NoIndicators::default();
        let mut buildable = Buildable::new(fixed(4));
        buildable.start_building(Vec2Fixed::ZERO, &mut indicators);
        buildable.advance(fixed(2), Some(1), &mut indicators);

        buildable.cancel_building(&mut indicators);
        assert_eq!(buildable.state(), BuildState::Idle);
        assert_eq!(buildable.progress(), Fixed::ZERO);
        assert!(!buildable.is_building());
    }

    #[test]
    fn test_site_kind_capabilities() {
        assert_eq!(SiteKind::TurretBase.required_capability(), Capabilities::TURRET_BUILD);
        assert_eq!(SiteKind::Explosives.required_capability(), Capabilities::EXPLOSIVES);
        assert_eq!(SiteKind::Headquarters.required_capability(), Capabilities::HQ_BUILD);
    }
}
