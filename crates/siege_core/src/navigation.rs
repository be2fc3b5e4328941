//! Seams to the movement, terrain and progress-display services.
//!
//! The combat core never pathfinds or renders. It hands destinations to
//! a [`Mover`], asks a [`Terrain`] about cells and sight lines, and
//! drives progress bars through an [`IndicatorBridge`].
//!
//! The reference implementations here are deliberately simple and are
//! what the headless runner and the tests use:
//!
//! - [`StraightLineMover`]: moves bodies in straight lines at their speed
//! - [`GridTerrain`]: uniform grid with blocked cells
//! - [`NoIndicators`]: hands out handles and discards updates

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::math::{Fixed, Vec2Fixed};

// ============================================================================
// Mover
// ============================================================================

/// External movement service.
pub trait Mover {
    /// Register a body at a position. Replaces an existing body.
    fn place(&mut self, id: EntityId, position: Vec2Fixed);

    /// Forget a body.
    fn remove(&mut self, id: EntityId);

    /// Start travelling toward a point.
    fn set_destination(&mut self, id: EntityId, destination: Vec2Fixed);

    /// Current destination, if travelling.
    fn destination(&self, id: EntityId) -> Option<Vec2Fixed>;

    /// Set travel speed in units per second.
    fn set_speed(&mut self, id: EntityId, speed: Fixed);

    /// Stop where the body stands.
    fn stop(&mut self, id: EntityId);

    /// Check whether the body has no destination left.
    fn is_stopped(&self, id: EntityId) -> bool;

    /// Body position.
    fn position(&self, id: EntityId) -> Option<Vec2Fixed>;

    /// Body velocity. Zero while stopped.
    fn velocity(&self, id: EntityId) -> Vec2Fixed;

    /// Advance every body by `dt` seconds.
    fn advance(&mut self, dt: Fixed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Body {
    position: Vec2Fixed,
    destination: Option<Vec2Fixed>,
    speed: Fixed,
    velocity: Vec2Fixed,
}

/// Moves bodies straight toward their destinations, ignoring terrain.
#[derive(Debug, Clone, Default)]
pub struct StraightLineMover {
    bodies: BTreeMap<EntityId, Body>,
}

impl StraightLineMover {
    /// Create a mover with no bodies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Check whether no body is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

impl Mover for StraightLineMover {
    fn place(&mut self, id: EntityId, position: Vec2Fixed) {
        self.bodies.insert(
            id,
            Body {
                position,
                destination: None,
                speed: Fixed::ONE,
                velocity: Vec2Fixed::ZERO,
            },
        );
    }

    fn remove(&mut self, id: EntityId) {
        self.bodies.remove(&id);
    }

    fn set_destination(&mut self, id: EntityId, destination: Vec2Fixed) {
        if let Some(body) = self.bodies.get_mut(&id) {
            if body.position == destination {
                body.destination = None;
                body.velocity = Vec2Fixed::ZERO;
            } else {
                body.destination = Some(destination);
            }
        }
    }

    fn destination(&self, id: EntityId) -> Option<Vec2Fixed> {
        self.bodies.get(&id).and_then(|b| b.destination)
    }

    fn set_speed(&mut self, id: EntityId, speed: Fixed) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.speed = speed.max(Fixed::ZERO);
        }
    }

    fn stop(&mut self, id: EntityId) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.destination = None;
            body.velocity = Vec2Fixed::ZERO;
        }
    }

    fn is_stopped(&self, id: EntityId) -> bool {
        self.bodies.get(&id).map_or(true, |b| b.destination.is_none())
    }

    fn position(&self, id: EntityId) -> Option<Vec2Fixed> {
        self.bodies.get(&id).map(|b| b.position)
    }

    fn velocity(&self, id: EntityId) -> Vec2Fixed {
        self.bodies.get(&id).map_or(Vec2Fixed::ZERO, |b| b.velocity)
    }

    fn advance(&mut self, dt: Fixed) {
        for body in self.bodies.values_mut() {
            let Some(destination) = body.destination else {
                body.velocity = Vec2Fixed::ZERO;
                continue;
            };

            let to_destination = destination - body.position;
            let distance = to_destination.length();
            let step = body.speed * dt;

            if distance <= step {
                body.position = destination;
                body.destination = None;
                body.velocity = Vec2Fixed::ZERO;
            } else {
                let direction = to_destination.normalize();
                body.position = body.position + direction.scale(step);
                body.velocity = direction.scale(body.speed);
            }
        }
    }
}

// ============================================================================
// Terrain
// ============================================================================

/// Integer cell coordinates on the terrain grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridCell {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl GridCell {
    /// Create a cell.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev (ring) distance to another cell.
    #[must_use]
    pub fn ring_distance(self, other: Self) -> u32 {
        (self.x - other.x).unsigned_abs().max((self.y - other.y).unsigned_abs())
    }

    /// Cells at exactly `radius` rings from this one, row-major.
    #[must_use]
    pub fn ring(self, radius: u32) -> Vec<Self> {
        let r = radius as i32;
        if r == 0 {
            return vec![self];
        }
        let mut cells = Vec::with_capacity((8 * radius) as usize);
        for dy in -r..=r {
            for dx in -r..=r {
                if dx.abs() == r || dy.abs() == r {
                    cells.push(Self::new(self.x + dx, self.y + dy));
                }
            }
        }
        cells
    }
}

/// External terrain service.
pub trait Terrain {
    /// Cell containing a world position.
    fn cell_of(&self, position: Vec2Fixed) -> GridCell;

    /// World position of a cell's centre.
    fn cell_center(&self, cell: GridCell) -> Vec2Fixed;

    /// Check whether a unit may stand on a cell.
    fn is_walkable(&self, cell: GridCell) -> bool;

    /// Check whether terrain blocks the sight line between two points.
    fn line_of_sight_blocked(&self, from: Vec2Fixed, to: Vec2Fixed) -> bool;

    /// Snap a position to the centre of its cell.
    fn snap_to_grid(&self, position: Vec2Fixed) -> Vec2Fixed {
        self.cell_center(self.cell_of(position))
    }
}

/// Uniform grid terrain with a set of blocked cells.
///
/// Cells outside the grid are not walkable but do not block sight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridTerrain {
    width: i32,
    height: i32,
    cell_size: Fixed,
    blocked: BTreeSet<GridCell>,
}

impl GridTerrain {
    /// Create an open grid.
    #[must_use]
    pub fn new(width: u32, height: u32, cell_size: Fixed) -> Self {
        Self {
            width: i32::try_from(width).unwrap_or(i32::MAX),
            height: i32::try_from(height).unwrap_or(i32::MAX),
            cell_size,
            blocked: BTreeSet::new(),
        }
    }

    /// Mark a cell as blocked.
    pub fn block(&mut self, cell: GridCell) {
        self.blocked.insert(cell);
    }

    /// Clear a blocked cell.
    pub fn unblock(&mut self, cell: GridCell) {
        self.blocked.remove(&cell);
    }

    /// Cell edge length.
    #[must_use]
    pub const fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    /// Check whether a cell lies on the grid.
    #[must_use]
    pub fn in_bounds(&self, cell: GridCell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    fn blocks_sight(&self, x: i32, y: i32) -> bool {
        self.blocked.contains(&GridCell::new(x, y))
    }
}

impl Terrain for GridTerrain {
    fn cell_of(&self, position: Vec2Fixed) -> GridCell {
        let x = (position.x / self.cell_size).floor().to_num::<i32>();
        let y = (position.y / self.cell_size).floor().to_num::<i32>();
        GridCell::new(x, y)
    }

    fn cell_center(&self, cell: GridCell) -> Vec2Fixed {
        let half = self.cell_size / Fixed::from_num(2);
        Vec2Fixed::new(
            Fixed::from_num(cell.x) * self.cell_size + half,
            Fixed::from_num(cell.y) * self.cell_size + half,
        )
    }

    fn is_walkable(&self, cell: GridCell) -> bool {
        self.in_bounds(cell) && !self.blocked.contains(&cell)
    }

    /// Bresenham walk over the cells strictly between the endpoints.
    fn line_of_sight_blocked(&self, from: Vec2Fixed, to: Vec2Fixed) -> bool {
        let start = self.cell_of(from);
        let end = self.cell_of(to);

        let dx = (end.x - start.x).abs();
        let dy = (end.y - start.y).abs();
        let sx = if start.x < end.x { 1 } else { -1 };
        let sy = if start.y < end.y { 1 } else { -1 };
        let mut err = dx - dy;

        let mut x = start.x;
        let mut y = start.y;

        loop {
            let at_endpoint = (x == start.x && y == start.y) || (x == end.x && y == end.y);
            if !at_endpoint && self.blocks_sight(x, y) {
                return true;
            }

            if x == end.x && y == end.y {
                return false;
            }

            let e2 = 2 * err;

            // Diagonal steps may not squeeze between two blocked corners
            if e2 > -dy && e2 < dx && self.blocks_sight(x + sx, y) && self.blocks_sight(x, y + sy) {
                return true;
            }

            if e2 > -dy {
                err -= dy;
                x += sx;
            }
            if e2 < dx {
                err += dx;
                y += sy;
            }
        }
    }
}

// ============================================================================
// Indicators
// ============================================================================

/// Handle to an external progress indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndicatorHandle(pub u64);

/// External progress-display service.
pub trait IndicatorBridge {
    /// Create an indicator anchored at a position.
    fn create_indicator(&mut self, anchor: Vec2Fixed) -> IndicatorHandle;

    /// Update an indicator's value.
    fn update_indicator(&mut self, handle: IndicatorHandle, current: Fixed, max: Fixed);

    /// Remove an indicator.
    fn remove_indicator(&mut self, handle: IndicatorHandle);
}

/// Indicator bridge that displays nothing.
#[derive(Debug, Clone, Default)]
pub struct NoIndicators {
    next: u64,
}

impl IndicatorBridge for NoIndicators {
    fn create_indicator(&mut self, _anchor: Vec2Fixed) -> IndicatorHandle {
        self.next += 1;
        IndicatorHandle(self.next)
    }

    fn update_indicator(&mut self, _handle: IndicatorHandle, _current: Fixed, _max: Fixed) {}

    fn remove_indicator(&mut self, _handle: IndicatorHandle) {}
}
