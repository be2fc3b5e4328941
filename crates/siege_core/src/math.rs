//! Fixed-point math utilities for deterministic simulation.
//!
//! All combat math uses fixed-point arithmetic so that two runs of the
//! same session produce bit-identical results. Angles are only ever
//! needed for facing and sight cones, so trigonometry is provided as
//! small polynomial approximations over [`Fixed`] rather than through
//! floating point.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// π as raw `I32F32` bits.
pub const PI: Fixed = Fixed::from_bits(13_493_037_705);

/// π / 2 as raw `I32F32` bits.
pub const FRAC_PI_2: Fixed = Fixed::from_bits(6_746_518_853);

/// 2π as raw `I32F32` bits.
pub const TAU: Fixed = Fixed::from_bits(26_986_075_409);

/// Fixed-point 2D vector on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "decimal_serde")]
    pub x: Fixed,
    /// Y coordinate (the world's forward axis).
    #[serde(with = "decimal_serde")]
    pub y: Fixed,
}

/// Serde support for hand-authored fixed-point values.
///
/// Config and scenario files are written by people, so they carry
/// decimals (`radius: 6.5`) instead of raw bits. Parsing is the only
/// place a float touches the simulation, and the conversion is exact
/// for any value with a short binary fraction.
pub mod decimal_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_num::<f64>().serialize(serializer)
    }

    /// Deserialize a fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(value)
            .ok_or_else(|| serde::de::Error::custom(format!("{value} is out of fixed-point range")))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Unit vector along the forward (+y) axis.
    pub const FORWARD: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ONE,
    };

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Calculate squared distance (avoids sqrt for comparisons).
    ///
    /// Saturates at [`Fixed::MAX`] for points too far apart to square.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x.saturating_sub(other.x);
        let dy = self.y.saturating_sub(other.y);
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Calculate the distance between two points.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x.saturating_mul(other.x).saturating_add(self.y.saturating_mul(other.y))
    }

    /// Z component of the 3D cross product. Positive when `other` lies
    /// counter-clockwise of `self`.
    #[must_use]
    pub fn cross(self, other: Self) -> Fixed {
        self.x * other.y - self.y * other.x
    }

    /// Vector length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Check whether both components are zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.x == Fixed::ZERO && self.y == Fixed::ZERO
    }

    /// Scale by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len_sq = self.dot(self);

        if len_sq == Fixed::ZERO {
            return Self::ZERO;
        }

        let len = fixed_sqrt(len_sq);
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.y / len)
    }

    /// Rotate counter-clockwise by `radians`.
    #[must_use]
    pub fn rotate(self, radians: Fixed) -> Self {
        let (sin, cos) = sin_cos(radians);
        Self::new(
            self.x * cos - self.y * sin,
            self.x * sin + self.y * cos,
        )
    }

    /// Express a local offset (x = right, y = forward) in world space for
    /// an observer facing along `facing`.
    #[must_use]
    pub fn local_to_world(self, facing: Self) -> Self {
        let forward = facing.normalize();
        let forward = if forward.is_zero() {
            Self::FORWARD
        } else {
            forward
        };
        let right = Self::new(forward.y, -forward.x);
        right.scale(self.x) + forward.scale(self.y)
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::from_num(1) {
        value
    } else {
        Fixed::from_num(1)
    };

    for _ in 0..64 {
        let mid = (low + high) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    // The search never lands on `high`, so exact roots come out one ulp low.
    let next = low + Fixed::DELTA;
    if next.saturating_mul(next) <= value {
        next
    } else {
        low
    }
}

/// Convert degrees to radians.
#[must_use]
pub fn deg_to_rad(degrees: Fixed) -> Fixed {
    degrees * PI / Fixed::from_num(180)
}

/// Sine and cosine of an angle in radians.
///
/// The angle is reduced to `[-π/2, π/2]` and evaluated with a Taylor
/// polynomial; the error stays below 1e-6 across the full circle.
#[must_use]
pub fn sin_cos(radians: Fixed) -> (Fixed, Fixed) {
    let mut x = radians % TAU;
    if x > PI {
        x -= TAU;
    } else if x < -PI {
        x += TAU;
    }

    // sin(π - x) = sin(x), cos(π - x) = -cos(x)
    let (x, flip_cos) = if x > FRAC_PI_2 {
        (PI - x, true)
    } else if x < -FRAC_PI_2 {
        (-PI - x, true)
    } else {
        (x, false)
    };

    let x2 = x * x;
    // sin x = x(1 - x²/6(1 - x²/20(1 - x²/42(1 - x²/72))))
    let sin = x
        * (Fixed::ONE
            - x2 / Fixed::from_num(6)
                * (Fixed::ONE
                    - x2 / Fixed::from_num(20)
                        * (Fixed::ONE
                            - x2 / Fixed::from_num(42) * (Fixed::ONE - x2 / Fixed::from_num(72)))));
    // cos x = 1 - x²/2(1 - x²/12(1 - x²/30(1 - x²/56)))
    let cos = Fixed::ONE
        - x2 / Fixed::from_num(2)
            * (Fixed::ONE
                - x2 / Fixed::from_num(12)
                    * (Fixed::ONE
                        - x2 / Fixed::from_num(30) * (Fixed::ONE - x2 / Fixed::from_num(56))));

    if flip_cos {
        (sin, -cos)
    } else {
        (sin, cos)
    }
}

/// Turn `current` toward `desired` by at most `max_radians`.
///
/// Both directions may be unnormalized; the result is a unit vector.
/// A zero `desired` leaves the facing unchanged.
#[must_use]
pub fn rotate_toward(current: Vec2Fixed, desired: Vec2Fixed, max_radians: Fixed) -> Vec2Fixed {
    let desired = desired.normalize();
    if desired.is_zero() {
        return current;
    }
    let current = current.normalize();
    if current.is_zero() {
        return desired;
    }

    let (_, cos_step) = sin_cos(max_radians);
    if max_radians >= PI || current.dot(desired) >= cos_step {
        return desired;
    }

    let step = if current.cross(desired) >= Fixed::ZERO {
        max_radians
    } else {
        -max_radians
    };
    current.rotate(step).normalize()
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Neg for Vec2Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epsilon() -> Fixed {
        Fixed::ONE / Fixed::from_num(10000)
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::new(Fixed::from_num(3), Fixed::from_num(0));
        let b = Vec2Fixed::new(Fixed::from_num(0), Fixed::from_num(4));
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
        assert!((a.distance(b) - Fixed::from_num(5)).abs() < epsilon());
    }

    #[test]
    fn test_vec2_distance_squared_saturates() {
        let a = Vec2Fixed::new(Fixed::from_num(-60_000), Fixed::ZERO);
        let b = Vec2Fixed::new(Fixed::from_num(60_000), Fixed::from_num(60_000));
        assert_eq!(a.distance_squared(b), Fixed::MAX);
        assert_eq!(b.dot(b), Fixed::MAX);

        // Far points still compare as farther than anything in reach
        let near = Vec2Fixed::new(Fixed::from_num(100), Fixed::ZERO);
        assert!(near.distance_squared(Vec2Fixed::ZERO) < a.distance_squared(b));
    }

    #[test]
    fn test_vec2_normalize() {
        let v = Vec2Fixed::new(Fixed::from_num(3), Fixed::from_num(4));
        let norm = v.normalize();

        let len_sq = norm.dot(norm);
        assert!((len_sq - Fixed::ONE).abs() < epsilon());

        let ratio_diff = (norm.x * Fixed::from_num(4)) - (norm.y * Fixed::from_num(3));
        assert!(ratio_diff.abs() < epsilon());
    }

    #[test]
    fn test_sin_cos_known_angles() {
        let cases = [(0, 0.0, 1.0), (30, 0.5, 0.866_025_4), (90, 1.0, 0.0), (180, 0.0, -1.0)];
        for (deg, sin_expected, cos_expected) in cases {
            let (sin, cos) = sin_cos(deg_to_rad(Fixed::from_num(deg)));
            assert!(
                (sin - Fixed::from_num(sin_expected)).abs() < epsilon(),
                "sin({deg}) = {sin}"
            );
            assert!(
                (cos - Fixed::from_num(cos_expected)).abs() < epsilon(),
                "cos({deg}) = {cos}"
            );
        }

        let (sin, cos) = sin_cos(deg_to_rad(Fixed::from_num(-135)));
        assert!((sin + Fixed::from_num(0.707_106_8)).abs() < epsilon());
        assert!((cos + Fixed::from_num(0.707_106_8)).abs() < epsilon());
    }

    #[test]
    fn test_local_to_world_follows_facing() {
        let right_of_squad = Vec2Fixed::from_ints(1, 0);

        // Facing +y: local right is world +x
        let world = right_of_squad.local_to_world(Vec2Fixed::FORWARD);
        assert_eq!(world, Vec2Fixed::from_ints(1, 0));

        // Facing +x: local right is world -y
        let world = right_of_squad.local_to_world(Vec2Fixed::from_ints(1, 0));
        assert_eq!(world, Vec2Fixed::from_ints(0, -1));
    }

    #[test]
    fn test_rotate_toward_is_capped() {
        let current = Vec2Fixed::FORWARD;
        let desired = Vec2Fixed::from_ints(1, 0);
        let step = deg_to_rad(Fixed::from_num(30));

        let turned = rotate_toward(current, desired, step);
        // Turning clockwise by 30 degrees from +y
        assert!((turned.x - Fixed::from_num(0.5)).abs() < epsilon());
        assert!((turned.y - Fixed::from_num(0.866_025_4)).abs() < epsilon());

        // A large enough step snaps to the desired direction
        let snapped = rotate_toward(current, desired, deg_to_rad(Fixed::from_num(120)));
        assert_eq!(snapped, desired);
    }
}
