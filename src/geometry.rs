//! Joint angle geometry
//!
//! Angle at the middle point of a triplet, via the normalized dot product of
//! the two limb vectors. Works on image-space coordinates in 2D (x, y) or 3D
//! (x, y, z).

use serde::{Deserialize, Serialize};

/// Below this length a limb vector is treated as degenerate
const MIN_VECTOR_LENGTH: f64 = 1e-9;

/// 3D point in normalized image space
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn midpoint(self, other: Self) -> Self {
        Self {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
            z: (self.z + other.z) / 2.0,
        }
    }

    /// Drop the depth axis
    pub fn flatten(self) -> Self {
        Self { z: 0.0, ..self }
    }

    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    fn length(self) -> f64 {
        self.dot(self).sqrt()
    }
}

/// Angle at `b` in degrees between `b→a` and `b→c`, ignoring depth.
///
/// Returns 0 when either vector has zero length.
pub fn angle_2d(a: Point3, b: Point3, c: Point3) -> f64 {
    angle_3d(a.flatten(), b.flatten(), c.flatten())
}

/// Angle at `b` in degrees between `b→a` and `b→c`.
///
/// Returns 0 when either vector has zero length.
pub fn angle_3d(a: Point3, b: Point3, c: Point3) -> f64 {
    let ba = a.sub(b);
    let bc = c.sub(b);

    let mag_ba = ba.length();
    let mag_bc = bc.length();
    if mag_ba < MIN_VECTOR_LENGTH || mag_bc < MIN_VECTOR_LENGTH {
        return 0.0;
    }

    let cos_angle = (ba.dot(bc) / (mag_ba * mag_bc)).clamp(-1.0, 1.0);
    cos_angle.acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_straight_limb_is_180() {
        let angle = angle_2d(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.5, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        );
        assert!((angle - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_right_angle() {
        let angle = angle_2d(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.5, 0.0, 0.0),
            Point3::new(0.5, 0.5, 0.0),
        );
        assert!((angle - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_2d_ignores_depth_but_3d_does_not() {
        let a = Point3::new(0.0, 1.0, 0.0);
        let b = Point3::new(0.0, 0.0, 0.0);
        let c = Point3::new(1.0, 0.0, 1.0);

        assert!((angle_2d(a, b, c) - 90.0).abs() < 1e-6);
        assert!((angle_3d(a, b, c) - 90.0).abs() < 1e-6);

        let c_forward = Point3::new(0.0, 1.0, 1.0);
        // Same direction as `a` in 2D, 45 degrees apart in 3D
        assert!(angle_2d(a, b, c_forward).abs() < 1e-6);
        assert!((angle_3d(a, b, c_forward) - 45.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_vector_returns_zero() {
        let p = Point3::new(0.3, 0.3, 0.1);
        assert_eq!(angle_3d(p, p, Point3::new(1.0, 1.0, 1.0)), 0.0);
        assert_eq!(angle_2d(Point3::new(0.0, 0.0, 0.0), p, p), 0.0);
    }
}
