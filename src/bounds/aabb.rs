use crate::error::RegionError;
use crate::math::{Point3, Vector3};

const AXES: [char; 3] = ['x', 'y', 'z'];

/// An axis-aligned bounding box.
///
/// Bounds may be infinite (unbounded sides) or inverted (empty box); use
/// [`DrawingVolume`] where a finite, valid region is required.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3,
    /// Maximum corner of the bounding box.
    pub max: Point3,
}

impl Aabb {
    #[must_use]
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// Creates a box from `[xmin, xmax, ymin, ymax, zmin, zmax]`.
    #[must_use]
    pub fn from_ranges(r: [f64; 6]) -> Self {
        Self::new(Point3::new(r[0], r[2], r[4]), Point3::new(r[1], r[3], r[5]))
    }

    /// The box covering all of space.
    #[must_use]
    pub fn universal() -> Self {
        Self::new(
            Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
        )
    }

    /// The box containing nothing; identity of [`Aabb::union`].
    #[must_use]
    pub fn empty() -> Self {
        Self::new(
            Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        )
    }

    /// Returns `true` when `max < min` on some axis.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.max[i] < self.min[i])
    }

    /// Returns `true` when every bound is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        (0..3).all(|i| self.min[i].is_finite() && self.max[i].is_finite())
    }

    /// Returns `true` when no side of the box is bounded.
    #[must_use]
    pub fn is_universal(&self) -> bool {
        (0..3).all(|i| self.min[i] == f64::NEG_INFINITY && self.max[i] == f64::INFINITY)
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = *self;
        for i in 0..3 {
            out.min[i] = self.min[i].max(other.min[i]);
            out.max[i] = self.max[i].min(other.max[i]);
        }
        out
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let mut out = *self;
        for i in 0..3 {
            out.min[i] = self.min[i].min(other.min[i]);
            out.max[i] = self.max[i].max(other.max[i]);
        }
        out
    }

    /// Scales the box about its center by `factor`. Infinite sides stay infinite.
    #[must_use]
    pub fn expanded(&self, factor: f64) -> Self {
        if !self.is_finite() || self.is_empty() {
            return *self;
        }
        let center = self.center();
        let half = self.extent() * (0.5 * factor);
        Self::new(center - half, center + half)
    }

    #[must_use]
    pub fn extent(&self) -> Vector3 {
        self.max - self.min
    }

    #[must_use]
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    #[must_use]
    pub fn volume(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let e = self.extent();
        e.x * e.y * e.z
    }

    #[must_use]
    pub fn contains(&self, p: &Point3) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// Signed distance-like value: negative inside, positive outside.
    #[must_use]
    pub fn value(&self, p: &Point3) -> f64 {
        (0..3)
            .map(|i| (self.min[i] - p[i]).max(p[i] - self.max[i]))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// The eight corner points.
    #[must_use]
    pub fn corners(&self) -> [Point3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(b.x, b.y, b.z),
            Point3::new(a.x, b.y, b.z),
        ]
    }
}

/// A finite axis-aligned region to render, with `max >= min` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawingVolume(Aabb);

impl DrawingVolume {
    /// Creates a validated drawing volume.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::Inverted`] when `max < min` on some axis and
    /// [`RegionError::NonFinite`] for infinite or NaN bounds.
    pub fn new(min: Point3, max: Point3) -> Result<Self, RegionError> {
        Self::from_aabb(Aabb::new(min, max))
    }

    /// Validates an arbitrary box as a drawing volume.
    ///
    /// # Errors
    ///
    /// See [`DrawingVolume::new`].
    pub fn from_aabb(aabb: Aabb) -> Result<Self, RegionError> {
        for (i, axis) in AXES.iter().enumerate() {
            let (min, max) = (aabb.min[i], aabb.max[i]);
            if !min.is_finite() || !max.is_finite() {
                return Err(RegionError::NonFinite { axis: *axis });
            }
            if max < min {
                return Err(RegionError::Inverted {
                    axis: *axis,
                    min,
                    max,
                });
            }
        }
        Ok(Self(aabb))
    }

    /// Creates a volume from `[xmin, xmax, ymin, ymax, zmin, zmax]`.
    ///
    /// # Errors
    ///
    /// See [`DrawingVolume::new`].
    pub fn from_ranges(r: [f64; 6]) -> Result<Self, RegionError> {
        Self::from_aabb(Aabb::from_ranges(r))
    }

    #[must_use]
    pub fn aabb(&self) -> &Aabb {
        &self.0
    }

    #[must_use]
    pub fn min(&self) -> &Point3 {
        &self.0.min
    }

    #[must_use]
    pub fn max(&self) -> &Point3 {
        &self.0.max
    }

    #[must_use]
    pub fn contains(&self, p: &Point3) -> bool {
        self.0.contains(p)
    }
}
