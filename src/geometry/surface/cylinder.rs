use crate::bounds::Aabb;
use crate::error::{GeometryError, Result};
use crate::math::{axis_index, Point3, Vector3, TOLERANCE};

use super::{axial_split, Surface};

/// An infinite cylindrical surface in 3D space; the "-" side is the interior.
///
/// Defined by a center point on the axis, radius and axis direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Cylinder {
    center: Point3,
    radius: f64,
    axis: Vector3,
}

impl Cylinder {
    /// Creates a new cylinder.
    ///
    /// # Arguments
    ///
    /// * `center` - A point on the cylinder axis
    /// * `radius` - Radius (must be positive)
    /// * `axis` - Axis direction (will be normalized)
    ///
    /// # Errors
    ///
    /// Returns an error if the radius is non-positive or the axis is zero-length.
    pub fn new(center: Point3, radius: f64, axis: Vector3) -> Result<Self> {
        if radius < TOLERANCE {
            return Err(
                GeometryError::Degenerate("cylinder radius must be positive".into()).into(),
            );
        }

        let axis_len = axis.norm();
        if axis_len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        let axis = axis / axis_len;

        Ok(Self {
            center,
            radius,
            axis,
        })
    }

    /// Returns the center point on the axis.
    #[must_use]
    pub fn center(&self) -> &Point3 {
        &self.center
    }

    /// Returns the radius.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Returns the axis direction.
    #[must_use]
    pub fn axis(&self) -> &Vector3 {
        &self.axis
    }
}

impl Surface for Cylinder {
    fn value(&self, p: &Point3) -> f64 {
        let (_, radial) = axial_split(p, &self.center, &self.axis);
        radial - self.radius
    }

    fn negative_bounds(&self) -> Aabb {
        let mut b = Aabb::universal();
        if let Some(along) = axis_index(&self.axis) {
            for i in (0..3).filter(|&i| i != along) {
                b.min[i] = self.center[i] - self.radius;
                b.max[i] = self.center[i] + self.radius;
            }
        }
        b
    }
}
