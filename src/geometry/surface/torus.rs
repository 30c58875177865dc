use crate::bounds::Aabb;
use crate::error::{GeometryError, Result};
use crate::math::{Point3, Vector3, TOLERANCE};

use super::{axial_split, Surface};

/// A toroidal surface in 3D space; the "-" side is the tube interior.
///
/// Defined by a center, an axis of revolution, the major radius (distance
/// from the center to the tube center) and the minor radius (tube radius).
#[derive(Debug, Clone, PartialEq)]
pub struct Torus {
    center: Point3,
    axis: Vector3,
    major_radius: f64,
    minor_radius: f64,
}

impl Torus {
    /// Creates a new torus.
    ///
    /// # Errors
    ///
    /// Returns an error if either radius is non-positive or the axis is zero-length.
    pub fn new(
        center: Point3,
        axis: Vector3,
        major_radius: f64,
        minor_radius: f64,
    ) -> Result<Self> {
        if major_radius < TOLERANCE || minor_radius < TOLERANCE {
            return Err(
                GeometryError::Degenerate("torus radii must be positive".into()).into(),
            );
        }
        let axis_len = axis.norm();
        if axis_len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        Ok(Self {
            center,
            axis: axis / axis_len,
            major_radius,
            minor_radius,
        })
    }

    /// Returns the center point.
    #[must_use]
    pub fn center(&self) -> &Point3 {
        &self.center
    }

    /// Returns the axis of revolution.
    #[must_use]
    pub fn axis(&self) -> &Vector3 {
        &self.axis
    }

    /// Returns the major radius.
    #[must_use]
    pub fn major_radius(&self) -> f64 {
        self.major_radius
    }

    /// Returns the minor radius.
    #[must_use]
    pub fn minor_radius(&self) -> f64 {
        self.minor_radius
    }
}

impl Surface for Torus {
    fn value(&self, p: &Point3) -> f64 {
        let (h, radial) = axial_split(p, &self.center, &self.axis);
        (radial - self.major_radius).hypot(h) - self.minor_radius
    }

    fn negative_bounds(&self) -> Aabb {
        let half = Vector3::from_fn(|i, _| {
            let a = self.axis[i];
            self.minor_radius + self.major_radius * (1.0 - a * a).max(0.0).sqrt()
        });
        Aabb::new(self.center - half, self.center + half)
    }
}
