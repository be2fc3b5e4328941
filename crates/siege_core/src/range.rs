//! Spatial range queries.
//!
//! Pure functions that classify distances into range bands, test sight
//! cones and pick the nearest matching candidate. Nothing here touches
//! simulation state.

use serde::{Deserialize, Serialize};

use crate::components::{RangeClass, RangeKind};
use crate::math::{decimal_serde, deg_to_rad, sin_cos, Fixed, Vec2Fixed};

/// Search radius large enough to cover any map whose squared distances fit.
pub const UNBOUNDED_RADIUS: Fixed = Fixed::from_bits(40_000_i64 << 32);

/// The three increasing radii that separate short, middle and long range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeRadii {
    /// Short range radius.
    #[serde(with = "decimal_serde")]
    pub short: Fixed,
    /// Middle range radius.
    #[serde(with = "decimal_serde")]
    pub middle: Fixed,
    /// Long range radius.
    #[serde(with = "decimal_serde")]
    pub long: Fixed,
}

impl RangeRadii {
    /// Create radii from integers.
    #[must_use]
    pub fn from_ints(short: i32, middle: i32, long: i32) -> Self {
        Self {
            short: Fixed::from_num(short),
            middle: Fixed::from_num(middle),
            long: Fixed::from_num(long),
        }
    }

    /// Radius of a distance range. Explosive maps to short.
    #[must_use]
    pub const fn radius(&self, kind: RangeKind) -> Fixed {
        match kind {
            RangeKind::Short | RangeKind::Explosive => self.short,
            RangeKind::Middle => self.middle,
            RangeKind::Long => self.long,
        }
    }

    /// Check the radii are positive and strictly increasing.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.short > Fixed::ZERO && self.short < self.middle && self.middle < self.long
    }
}

impl Default for RangeRadii {
    fn default() -> Self {
        Self::from_ints(6, 12, 18)
    }
}

/// Classify the planar distance between two positions.
///
/// Bounds are inclusive: a target exactly on the short radius is short range.
#[must_use]
pub fn classify(origin: Vec2Fixed, target: Vec2Fixed, radii: &RangeRadii) -> RangeClass {
    let dist_sq = origin.distance_squared(target);
    if dist_sq <= radii.short * radii.short {
        RangeClass::Short
    } else if dist_sq <= radii.middle * radii.middle {
        RangeClass::Middle
    } else if dist_sq <= radii.long * radii.long {
        RangeClass::Long
    } else {
        RangeClass::OutOfRange
    }
}

/// A view cone centred on an observer's facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SightCone {
    cos_half_angle: Fixed,
}

impl SightCone {
    /// Create a cone from its half angle in degrees.
    #[must_use]
    pub fn from_degrees(half_angle: Fixed) -> Self {
        let (_, cos) = sin_cos(deg_to_rad(half_angle));
        Self {
            cos_half_angle: cos,
        }
    }

    /// Cosine of the half angle.
    #[must_use]
    pub const fn cos_half_angle(&self) -> Fixed {
        self.cos_half_angle
    }
}

impl Default for SightCone {
    fn default() -> Self {
        Self::from_degrees(Fixed::from_num(30))
    }
}

/// Check whether `target` lies inside the observer's sight cone.
///
/// A target at the observer's own position is always in sight. An
/// observer without a facing sees nothing.
#[must_use]
pub fn is_in_sight(origin: Vec2Fixed, target: Vec2Fixed, facing: Vec2Fixed, cone: &SightCone) -> bool {
    let to_target = (target - origin).normalize();
    if to_target.is_zero() {
        return true;
    }
    let facing = facing.normalize();
    if facing.is_zero() {
        return false;
    }
    facing.dot(to_target) >= cone.cos_half_angle
}

/// Find the nearest candidate within `max_radius` that satisfies `predicate`.
///
/// Linear scan in input order with a strict comparison, so equally near
/// candidates resolve to the first one encountered.
pub fn nearest_of_capability<T, I, P>(
    origin: Vec2Fixed,
    candidates: I,
    max_radius: Fixed,
    mut predicate: P,
) -> Option<T>
where
    I: IntoIterator<Item = (T, Vec2Fixed)>,
    P: FnMut(&T) -> bool,
{
    let max_sq = max_radius * max_radius;
    let mut best: Option<(T, Fixed)> = None;

    for (candidate, position) in candidates {
        let dist_sq = origin.distance_squared(position);
        if dist_sq > max_sq || !predicate(&candidate) {
            continue;
        }
        let closer = best.as_ref().map_or(true, |(_, best_sq)| dist_sq < *best_sq);
        if closer {
            best = Some((candidate, dist_sq));
        }
    }

    best.map(|(candidate, _)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec2(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    #[test]
    fn test_classify_bands() {
        let radii = RangeRadii::from_ints(6, 12, 18);
        let origin = vec2(0, 0);

        assert_eq!(classify(origin, vec2(3, 4), &radii), RangeClass::Short);
        assert_eq!(classify(origin, vec2(6, 0), &radii), RangeClass::Short);
        assert_eq!(classify(origin, vec2(0, 10), &radii), RangeClass::Middle);
        assert_eq!(classify(origin, vec2(-15, 0), &radii), RangeClass::Long);
        assert_eq!(classify(origin, vec2(18, 1), &radii), RangeClass::OutOfRange);
    }

    #[test]
    fn test_is_in_sight_cone() {
        let cone = SightCone::default();
        let origin = vec2(0, 0);
        let facing = Vec2Fixed::FORWARD;

        assert!(is_in_sight(origin, vec2(0, 10), facing, &cone));
        // ~26.6 degrees off axis
        assert!(is_in_sight(origin, vec2(5, 10), facing, &cone));
        // 45 degrees off axis
        assert!(!is_in_sight(origin, vec2(10, 10), facing, &cone));
        // Behind
        assert!(!is_in_sight(origin, vec2(0, -10), facing, &cone));
        // Same position
        assert!(is_in_sight(origin, origin, facing, &cone));
    }

    #[test]
    fn test_nearest_of_capability_empty() {
        let none: Vec<(u64, Vec2Fixed)> = Vec::new();
        assert_eq!(
            nearest_of_capability(vec2(0, 0), none, Fixed::from_num(10), |_| true),
            None
        );
    }

    #[test]
    fn test_nearest_of_capability_single_in_range() {
        let candidates = vec![(7_u64, vec2(2, 2))];
        assert_eq!(
            nearest_of_capability(vec2(0, 0), candidates, Fixed::from_num(10), |_| true),
            Some(7)
        );
    }

    #[test]
    fn test_nearest_of_capability_ties_resolve_to_first() {
        let candidates = vec![(1_u64, vec2(3, 0)), (2, vec2(0, 3)), (3, vec2(-3, 0))];
        assert_eq!(
            nearest_of_capability(vec2(0, 0), candidates, Fixed::from_num(10), |_| true),
            Some(1)
        );
    }

    #[test]
    fn test_nearest_of_capability_filters() {
        let candidates = vec![(1_u64, vec2(1, 0)), (2, vec2(4, 0)), (3, vec2(20, 0))];
        // Predicate rejects the closest
        assert_eq!(
            nearest_of_capability(vec2(0, 0), candidates.clone(), Fixed::from_num(10), |id| *id != 1),
            Some(2)
        );
        // Radius excludes everything that passes
        assert_eq!(
            nearest_of_capability(vec2(0, 0), candidates, Fixed::from_num(10), |id| *id == 3),
            None
        );
    }
}
