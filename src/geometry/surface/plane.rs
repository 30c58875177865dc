use crate::bounds::Aabb;
use crate::error::{GeometryError, Result};
use crate::math::{axis_index, Point3, Vector3, TOLERANCE};

use super::Surface;

/// An infinite plane in 3D space.
///
/// Defined by an origin point, and two orthogonal direction vectors
/// (`u_dir`, `v_dir`). The normal is `u_dir x v_dir`; the "-" side is the
/// half-space the normal points away from.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    origin: Point3,
    u_dir: Vector3,
    v_dir: Vector3,
    normal: Vector3,
}

impl Plane {
    /// Creates a new plane from an origin and two direction vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the direction vectors are zero-length
    /// or parallel (degenerate plane).
    pub fn new(origin: Point3, u_dir: Vector3, v_dir: Vector3) -> Result<Self> {
        let u_len = u_dir.norm();
        if u_len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        let v_len = v_dir.norm();
        if v_len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }

        let u_dir = u_dir / u_len;
        let v_dir = v_dir / v_len;

        let normal = u_dir.cross(&v_dir);
        let normal_len = normal.norm();
        if normal_len < TOLERANCE {
            return Err(
                GeometryError::Degenerate("plane directions are parallel".into()).into(),
            );
        }
        let normal = normal / normal_len;

        Ok(Self {
            origin,
            u_dir,
            v_dir,
            normal,
        })
    }

    /// Creates a plane from an origin and a normal vector.
    ///
    /// The U and V directions are computed automatically.
    ///
    /// # Errors
    ///
    /// Returns an error if the normal vector is zero-length or the origin is
    /// not finite.
    pub fn from_normal(origin: Point3, normal: Vector3) -> Result<Self> {
        if !origin.coords.iter().all(|c| c.is_finite()) {
            return Err(GeometryError::Degenerate("plane origin is not finite".into()).into());
        }
        let len = normal.norm();
        if len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        let normal = normal / len;

        // Choose a reference vector not parallel to the normal
        let reference = if normal.x.abs() < 0.9 {
            Vector3::new(1.0, 0.0, 0.0)
        } else {
            Vector3::new(0.0, 1.0, 0.0)
        };

        let u_dir = normal.cross(&reference).normalize();
        let v_dir = normal.cross(&u_dir);

        Ok(Self {
            origin,
            u_dir,
            v_dir,
            normal,
        })
    }

    /// Plane `x = d` with normal `+x`.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-finite `d`.
    pub fn px(d: f64) -> Result<Self> {
        Self::from_normal(Point3::new(d, 0.0, 0.0), Vector3::x())
    }

    /// Plane `y = d` with normal `+y`.
    ///
    /// # Errors
    ///
    /// See [`Plane::px`].
    pub fn py(d: f64) -> Result<Self> {
        Self::from_normal(Point3::new(0.0, d, 0.0), Vector3::y())
    }

    /// Plane `z = d` with normal `+z`.
    ///
    /// # Errors
    ///
    /// See [`Plane::px`].
    pub fn pz(d: f64) -> Result<Self> {
        Self::from_normal(Point3::new(0.0, 0.0, d), Vector3::z())
    }

    /// Returns the origin point of the plane.
    #[must_use]
    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    /// Returns the U direction vector.
    #[must_use]
    pub fn u_dir(&self) -> &Vector3 {
        &self.u_dir
    }

    /// Returns the V direction vector.
    #[must_use]
    pub fn v_dir(&self) -> &Vector3 {
        &self.v_dir
    }

    /// Returns the normal vector of the plane.
    #[must_use]
    pub fn plane_normal(&self) -> &Vector3 {
        &self.normal
    }

    /// Bounds of the side whose normal-projected coordinate has sign `side`.
    fn side_bounds(&self, side: f64) -> Aabb {
        let mut b = Aabb::universal();
        if let Some(i) = axis_index(&self.normal) {
            let outward = self.normal[i] * side;
            if outward < 0.0 {
                b.min[i] = self.origin[i];
            } else {
                b.max[i] = self.origin[i];
            }
        }
        b
    }
}

impl Surface for Plane {
    fn value(&self, p: &Point3) -> f64 {
        self.normal.dot(&(p - self.origin))
    }

    fn negative_bounds(&self) -> Aabb {
        self.side_bounds(1.0)
    }

    fn positive_bounds(&self) -> Aabb {
        self.side_bounds(-1.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn value_is_signed_distance() {
        let p = Plane::pz(1.0).unwrap();
        assert!((p.value(&Point3::new(5.0, -2.0, 3.0)) - 2.0).abs() < TOLERANCE);
        assert!((p.value(&Point3::new(0.0, 0.0, 0.0)) + 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn from_normal_builds_orthonormal_basis() {
        let p = Plane::from_normal(Point3::origin(), Vector3::new(1.0, 1.0, 1.0)).unwrap();
        assert!(p.u_dir().dot(p.plane_normal()).abs() < TOLERANCE);
        assert!(p.v_dir().dot(p.plane_normal()).abs() < TOLERANCE);
        assert!(p.u_dir().dot(p.v_dir()).abs() < TOLERANCE);
    }

    #[test]
    fn parallel_directions_are_rejected() {
        let r = Plane::new(Point3::origin(), Vector3::x(), Vector3::x() * 2.0);
        assert!(r.is_err());
    }

    #[test]
    fn axis_aligned_sides_are_half_bounded() {
        let p = Plane::px(2.0).unwrap();
        let neg = p.negative_bounds();
        assert!((neg.max.x - 2.0).abs() < TOLERANCE);
        assert_eq!(neg.min.x, f64::NEG_INFINITY);
        let pos = p.positive_bounds();
        assert!((pos.min.x - 2.0).abs() < TOLERANCE);
        assert_eq!(pos.max.x, f64::INFINITY);
    }

    #[test]
    fn flipped_normal_swaps_sides() {
        let p = Plane::from_normal(Point3::new(0.0, 0.0, 3.0), -Vector3::z()).unwrap();
        let neg = p.negative_bounds();
        assert!((neg.min.z - 3.0).abs() < TOLERANCE);
        assert_eq!(neg.max.z, f64::INFINITY);
    }

    #[test]
    fn oblique_plane_is_unbounded() {
        let p = Plane::from_normal(Point3::origin(), Vector3::new(1.0, 1.0, 0.0)).unwrap();
        assert!(p.negative_bounds().is_universal());
    }
}
