//! Sample-grid sizing for polygon construction.
//!
//! The requested points per cell is corrected for cell volume and aspect
//! ratio, then distributed over the axes with sub-linear length weights.
//! Every step is monotone in the requested count, so asking for more points
//! never yields fewer samples along any axis.

use tracing::warn;

use crate::bounds::Aabb;
use crate::error::{OperationError, Result};

pub const MIN_SAMPLES_PER_AXIS: usize = 5;
pub const MAX_SAMPLES_PER_AXIS: usize = 1000;
const MIN_SAMPLE_POINTS: usize = MIN_SAMPLES_PER_AXIS * MIN_SAMPLES_PER_AXIS * MIN_SAMPLES_PER_AXIS;
const MAX_CELL_VOLUME_FACTOR: f64 = 125.0;
const ASPECT_EXPONENT: f64 = 0.4;
const LENGTH_WEIGHT_EXPONENT: f64 = 0.6;
const BYTES_PER_SAMPLE: f64 = 8.0;
const BYTES_PER_MB: f64 = 1_048_576.0;

/// Sample counts along x, y and z for a grid spanning `bounds`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn grid_dims(bounds: &Aabb, points_per_cell: usize, smoothing: f64) -> [usize; 3] {
    let len = bounds.extent();
    if !bounds.is_finite() || len.iter().any(|&l| l <= 0.0) {
        return [MIN_SAMPLES_PER_AXIS; 3];
    }

    let mut points = points_per_cell.max(MIN_SAMPLE_POINTS) as f64;

    let volume = len.x * len.y * len.z;
    let volume_factor = if volume <= 1.0 {
        1.0
    } else {
        volume.powf(smoothing).min(MAX_CELL_VOLUME_FACTOR)
    };
    points *= volume_factor;

    let mean = (len.x + len.y + len.z) / 3.0;
    let aspect = len.norm() / 3f64.sqrt() * mean * mean / volume;
    points *= aspect.powf(ASPECT_EXPONENT);

    let w = len.map(|l| if l < 1.0 { l } else { l.powf(LENGTH_WEIGHT_EXPONENT) });
    let d0 = (points * w.x * w.x / (w.y * w.z)).cbrt();
    let dims = [d0, d0 * w.y / w.x, d0 * w.z / w.x];
    dims.map(|d| (d.round() as usize).clamp(MIN_SAMPLES_PER_AXIS, MAX_SAMPLES_PER_AXIS))
}

/// Memory needed by a sample grid, in MB.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn required_memory_mb(dims: [usize; 3]) -> f64 {
    (dims[0] * dims[1] * dims[2]) as f64 * BYTES_PER_SAMPLE / BYTES_PER_MB
}

/// Largest points-per-cell not above `requested` whose grid fits in
/// `available_mb`.
///
/// # Errors
///
/// Returns [`OperationError::MemoryLimit`] when even the smallest grid does not fit.
pub fn fit_to_memory(
    cell: &str,
    bounds: &Aabb,
    requested: usize,
    smoothing: f64,
    available_mb: f64,
) -> Result<usize> {
    let fits = |ppc: usize| required_memory_mb(grid_dims(bounds, ppc, smoothing)) <= available_mb;
    if fits(requested) {
        return Ok(requested);
    }
    let floor = requested.min(MIN_SAMPLE_POINTS);
    if !fits(floor) {
        return Err(OperationError::MemoryLimit {
            cell: cell.to_owned(),
            required_mb: required_memory_mb(grid_dims(bounds, floor, smoothing)),
            available_mb,
        }
        .into());
    }
    // fits(lo) holds and fits(hi) does not.
    let (mut lo, mut hi) = (floor, requested);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    warn!(
        cell,
        requested,
        effective = lo,
        available_mb,
        "sample count reduced to fit memory limit"
    );
    Ok(lo)
}
