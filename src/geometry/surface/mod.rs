mod cone;
mod cylinder;
mod plane;
mod sphere;
mod torus;

pub use cone::Cone;
pub use cylinder::Cylinder;
pub use plane::Plane;
pub use sphere::Sphere;
pub use torus::Torus;

use crate::bounds::Aabb;
use crate::math::Point3;

slotmap::new_key_type! {
    /// Unique identifier for a surface in the geometry model.
    pub struct SurfaceId;
}

/// Trait for analytic boundary surfaces with a signed-side test.
pub trait Surface {
    /// Signed, distance-like value at `p`.
    ///
    /// Negative on the "-" sense side, positive on the "+" side and zero on
    /// the surface itself.
    fn value(&self, p: &Point3) -> f64;

    /// Conservative bounds of the "-" side ([`Aabb::universal`] when unbounded).
    fn negative_bounds(&self) -> Aabb {
        Aabb::universal()
    }

    /// Conservative bounds of the "+" side ([`Aabb::universal`] when unbounded).
    fn positive_bounds(&self) -> Aabb {
        Aabb::universal()
    }
}

/// Any of the supported surface kinds.
#[derive(Debug, Clone)]
pub enum SurfaceKind {
    Plane(Plane),
    Sphere(Sphere),
    Cylinder(Cylinder),
    Cone(Cone),
    Torus(Torus),
}

impl SurfaceKind {
    fn as_surface(&self) -> &dyn Surface {
        match self {
            Self::Plane(s) => s,
            Self::Sphere(s) => s,
            Self::Cylinder(s) => s,
            Self::Cone(s) => s,
            Self::Torus(s) => s,
        }
    }
}

impl Surface for SurfaceKind {
    fn value(&self, p: &Point3) -> f64 {
        self.as_surface().value(p)
    }

    fn negative_bounds(&self) -> Aabb {
        self.as_surface().negative_bounds()
    }

    fn positive_bounds(&self) -> Aabb {
        self.as_surface().positive_bounds()
    }
}

impl From<Plane> for SurfaceKind {
    fn from(s: Plane) -> Self {
        Self::Plane(s)
    }
}

impl From<Sphere> for SurfaceKind {
    fn from(s: Sphere) -> Self {
        Self::Sphere(s)
    }
}

impl From<Cylinder> for SurfaceKind {
    fn from(s: Cylinder) -> Self {
        Self::Cylinder(s)
    }
}

impl From<Cone> for SurfaceKind {
    fn from(s: Cone) -> Self {
        Self::Cone(s)
    }
}

impl From<Torus> for SurfaceKind {
    fn from(s: Torus) -> Self {
        Self::Torus(s)
    }
}

/// Splits `p - origin` into the signed axial coordinate and the radial distance.
fn axial_split(p: &Point3, origin: &Point3, axis: &crate::math::Vector3) -> (f64, f64) {
    let d = p - origin;
    let h = d.dot(axis);
    let radial = (d - axis * h).norm();
    (h, radial)
}
