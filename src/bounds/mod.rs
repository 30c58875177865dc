mod aabb;
mod estimate;

pub use aabb::{Aabb, DrawingVolume};
pub use estimate::{rough_bounds, BoundingBoxCalculator, BoundsReport, CellEstimate, Exclusion};
