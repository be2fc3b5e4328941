//! Notifications and target liveness tracking.
//!
//! Every observable change is a [`GameEvent`] published on a named
//! [`Channel`]. UI, audio and animation layers subscribe closures to the
//! channels they care about through [`Notifications`].
//!
//! Subscribers are called when the simulation flushes, not at the
//! moment an event is raised: once at the end of every command such as
//! `request_move_to` or `retreat`, and once at the end of every tick.
//! Events reach subscribers in the order they were raised. A handler
//! never runs while a system is halfway through the arenas.
//!
//! Inside the core, target references are plain [`EntityId`]s. The
//! [`DeathWatch`] registry records who is aiming at whom so that a
//! death can invalidate every holder in one pass.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::buildings::SiteKind;
use crate::components::{EntityId, RangeKind, SquadId};
use crate::math::Fixed;

/// Named notification channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    /// A combatant's HP changed (or was hit for zero).
    HpChanged,
    /// A combatant's HP reached zero.
    HpDown,
    /// A soldier was wounded or recovered.
    WoundedChanged,
    /// A unit acquired or dropped a target.
    TargetChanged,
    /// A combatant fired.
    Fired,
    /// Construction advanced.
    BuildProgressChanged,
    /// Construction finished.
    BuildComplete,
    /// An explosive charge went off.
    Detonated,
    /// A turret came online.
    TurretActivated,
    /// A tower, enemy or turret left the battlefield.
    EntityRemoved,
    /// A squad unit was wiped out.
    UnitDestroyed,
    /// A squad unit made it back to headquarters.
    UnitReturnedToHq,
    /// A squad unit dropped its UI selection.
    SelectionCleared,
    /// The last squad unit of the attack session resolved.
    SessionResolved,
}

/// Events generated by the combat core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// HP changed.
    HpChanged {
        /// Damaged or healed entity.
        entity: EntityId,
        /// HP after the change.
        current: Fixed,
        /// Maximum HP.
        max: Fixed,
    },
    /// HP reached zero.
    HpDown {
        /// Entity that went down.
        entity: EntityId,
    },
    /// Wound state flipped.
    WoundedChanged {
        /// Soldier unit.
        entity: EntityId,
        /// New wound state.
        wounded: bool,
    },
    /// Target changed.
    TargetChanged {
        /// Entity holding the target.
        holder: EntityId,
        /// New target, `None` when cleared.
        target: Option<EntityId>,
    },
    /// A shot landed.
    Fired {
        /// Shooter.
        shooter: EntityId,
        /// Target.
        target: EntityId,
        /// Range band used.
        range: RangeKind,
        /// HP removed from the target.
        damage: Fixed,
    },
    /// Construction progress.
    BuildProgressChanged {
        /// Build site.
        site: EntityId,
        /// Percent complete, 0-100.
        percent: Fixed,
    },
    /// Construction finished.
    BuildComplete {
        /// Build site.
        site: EntityId,
        /// What was built.
        kind: SiteKind,
    },
    /// An explosive charge went off.
    Detonated {
        /// The charge's site.
        site: EntityId,
    },
    /// A turret came online.
    TurretActivated {
        /// Turret.
        turret: EntityId,
    },
    /// A tower, enemy or turret was removed.
    EntityRemoved {
        /// Removed entity.
        entity: EntityId,
    },
    /// A squad unit was wiped out.
    UnitDestroyed {
        /// Squad unit.
        unit: EntityId,
        /// Roster squad it was deployed from.
        squad: SquadId,
    },
    /// A squad unit returned to headquarters.
    UnitReturnedToHq {
        /// Squad unit.
        unit: EntityId,
        /// Roster squad it was deployed from.
        squad: SquadId,
    },
    /// A squad unit dropped its selection.
    SelectionCleared {
        /// Squad unit.
        unit: EntityId,
    },
    /// Every squad unit of the session has resolved.
    SessionResolved,
}

impl GameEvent {
    /// Channel this event is published on.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self {
            Self::HpChanged { .. } => Channel::HpChanged,
            Self::HpDown { .. } => Channel::HpDown,
            Self::WoundedChanged { .. } => Channel::WoundedChanged,
            Self::TargetChanged { .. } => Channel::TargetChanged,
            Self::Fired { .. } => Channel::Fired,
            Self::BuildProgressChanged { .. } => Channel::BuildProgressChanged,
            Self::BuildComplete { .. } => Channel::BuildComplete,
            Self::Detonated { .. } => Channel::Detonated,
            Self::TurretActivated { .. } => Channel::TurretActivated,
            Self::EntityRemoved { .. } => Channel::EntityRemoved,
            Self::UnitDestroyed { .. } => Channel::UnitDestroyed,
            Self::UnitReturnedToHq { .. } => Channel::UnitReturnedToHq,
            Self::SelectionCleared { .. } => Channel::SelectionCleared,
            Self::SessionResolved => Channel::SessionResolved,
        }
    }
}

// ============================================================================
// Subjects
// ============================================================================

/// Handle returned by [`Subject::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Rc<RefCell<dyn FnMut(&E)>>;

/// An ordered list of subscriber closures.
///
/// Emission iterates over a snapshot of the list, so a handler may
/// subscribe or unsubscribe (itself or others) while an emission is in
/// progress. Removals take effect for the next emission; a handler
/// removed mid-emission that has not run yet is skipped.
pub struct Subject<E> {
    subscribers: RefCell<Vec<(SubscriptionId, Handler<E>)>>,
    next_id: Cell<u64>,
}

impl<E> Subject<E> {
    /// Create a subject with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    /// Subscribe a handler. Handlers run in subscription order.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: FnMut(&E) + 'static,
    {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let handler: Handler<E> = Rc::new(RefCell::new(handler));
        self.subscribers.borrow_mut().push((id, handler));
        id
    }

    /// Remove a handler. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Check if nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    /// Deliver an event to every subscriber.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<(SubscriptionId, Handler<E>)> = self.subscribers.borrow().clone();
        for (id, handler) in snapshot {
            let still_subscribed = self
                .subscribers
                .borrow()
                .iter()
                .any(|(existing, _)| *existing == id);
            if !still_subscribed {
                continue;
            }
            // A handler that re-enters its own subject is not called recursively.
            if let Ok(mut handler) = handler.try_borrow_mut() {
                handler(event);
            }
        }
    }
}

impl<E> Default for Subject<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Subject<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject")
            .field("subscribers", &self.len())
            .finish()
    }
}

/// One [`Subject`] per [`Channel`].
#[derive(Debug, Default)]
pub struct Notifications {
    channels: BTreeMap<Channel, Subject<GameEvent>>,
}

impl Notifications {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one channel.
    pub fn subscribe<F>(&mut self, channel: Channel, handler: F) -> SubscriptionId
    where
        F: FnMut(&GameEvent) + 'static,
    {
        self.channels.entry(channel).or_default().subscribe(handler)
    }

    /// Unsubscribe from one channel.
    pub fn unsubscribe(&self, channel: Channel, id: SubscriptionId) -> bool {
        self.channels
            .get(&channel)
            .is_some_and(|subject| subject.unsubscribe(id))
    }

    /// Publish an event on its channel.
    pub fn dispatch(&self, event: &GameEvent) {
        if let Some(subject) = self.channels.get(&event.channel()) {
            subject.emit(event);
        }
    }
}

// ============================================================================
// Death Watch
// ============================================================================

/// Registry of `holder -> target` references.
///
/// Holding a target does not keep it alive. When the target goes down,
/// [`DeathWatch::take_watchers`] hands back every holder so their
/// references can be cleared.
#[derive(Debug, Clone, Default)]
pub struct DeathWatch {
    watchers: HashMap<EntityId, Vec<EntityId>>,
}

impl DeathWatch {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `holder` targets `target`.
    pub fn watch(&mut self, holder: EntityId, target: EntityId) {
        let holders = self.watchers.entry(target).or_default();
        if !holders.contains(&holder) {
            holders.push(holder);
        }
    }

    /// Remove a single `holder -> target` reference.
    pub fn unwatch(&mut self, holder: EntityId, target: EntityId) {
        if let Some(holders) = self.watchers.get_mut(&target) {
            holders.retain(|h| *h != holder);
            if holders.is_empty() {
                self.watchers.remove(&target);
            }
        }
    }

    /// Remove and return every holder of `target`, in watch order.
    pub fn take_watchers(&mut self, target: EntityId) -> Vec<EntityId> {
        self.watchers.remove(&target).unwrap_or_default()
    }

    /// Drop every reference held by `holder`.
    pub fn forget_holder(&mut self, holder: EntityId) {
        self.watchers.retain(|_, holders| {
            holders.retain(|h| *h != holder);
            !holders.is_empty()
        });
    }

    /// Holders currently watching `target`.
    #[must_use]
    pub fn watchers_of(&self, target: EntityId) -> &[EntityId] {
        self.watchers.get(&target).map_or(&[], Vec::as_slice)
    }
}

// ============================================================================
// Tick Events
// ============================================================================

/// Events generated during a simulation tick or command, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Tick the events belong to.
    pub tick: u64,
    /// Events in emission order.
    pub events: Vec<GameEvent>,
}

impl TickEvents {
    /// Events on a single channel.
    pub fn on(&self, channel: Channel) -> impl Iterator<Item = &GameEvent> {
        self.events.iter().filter(move |e| e.channel() == channel)
    }

    /// Number of events on a channel.
    #[must_use]
    pub fn count(&self, channel: Channel) -> usize {
        self.on(channel).count()
    }

    /// Check whether the session resolved during this tick.
    #[must_use]
    pub fn session_resolved(&self) -> bool {
        self.count(Channel::SessionResolved) > 0
    }
}
