use std::f64::consts::FRAC_PI_2;

use crate::error::{GeometryError, Result};
use crate::math::{Point3, Vector3, TOLERANCE};

use super::{axial_split, Surface};

/// A double-sheeted conical surface; the "-" side is the interior of both nappes.
#[derive(Debug, Clone, PartialEq)]
pub struct Cone {
    apex: Point3,
    axis: Vector3,
    half_angle: f64,
}

impl Cone {
    /// Creates a new cone.
    ///
    /// # Arguments
    ///
    /// * `apex` - The apex point
    /// * `axis` - Axis direction (will be normalized)
    /// * `half_angle` - Half-angle in radians, in `(0, pi/2)`
    ///
    /// # Errors
    ///
    /// Returns an error if the axis is zero-length or the half-angle is out of range.
    pub fn new(apex: Point3, axis: Vector3, half_angle: f64) -> Result<Self> {
        let axis_len = axis.norm();
        if axis_len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        if half_angle <= TOLERANCE || half_angle >= FRAC_PI_2 - TOLERANCE {
            return Err(GeometryError::Degenerate(
                "cone half-angle must be between 0 and pi/2".into(),
            )
            .into());
        }
        Ok(Self {
            apex,
            axis: axis / axis_len,
            half_angle,
        })
    }

    /// Returns the apex point.
    #[must_use]
    pub fn apex(&self) -> &Point3 {
        &self.apex
    }

    /// Returns the axis direction.
    #[must_use]
    pub fn axis(&self) -> &Vector3 {
        &self.axis
    }

    /// Returns the half-angle in radians.
    #[must_use]
    pub fn half_angle(&self) -> f64 {
        self.half_angle
    }
}

impl Surface for Cone {
    fn value(&self, p: &Point3) -> f64 {
        let (h, radial) = axial_split(p, &self.apex, &self.axis);
        let (sin, cos) = self.half_angle.sin_cos();
        radial * cos - h.abs() * sin
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::f64::consts::FRAC_PI_4;

    use super::*;

    #[test]
    fn both_nappes_are_inside() {
        let c = Cone::new(Point3::origin(), Vector3::z(), FRAC_PI_4).unwrap();
        assert!(c.value(&Point3::new(0.0, 0.0, 2.0)) < 0.0);
        assert!(c.value(&Point3::new(0.0, 0.0, -2.0)) < 0.0);
        assert!(c.value(&Point3::new(3.0, 0.0, 1.0)) > 0.0);
        assert!(c.value(&Point3::new(1.0, 0.0, 1.0)).abs() < TOLERANCE);
    }

    #[test]
    fn interior_is_unbounded() {
        let c = Cone::new(Point3::origin(), Vector3::x(), 0.3).unwrap();
        assert!(c.negative_bounds().is_universal());
    }

    #[test]
    fn invalid_half_angle() {
        assert!(Cone::new(Point3::origin(), Vector3::z(), 0.0).is_err());
        assert!(Cone::new(Point3::origin(), Vector3::z(), FRAC_PI_2).is_err());
    }
}
