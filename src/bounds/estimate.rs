use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::error::{EstimationError, Result};
use crate::geometry::{CellExpr, CellId, GeometryModel, Sense, Surface, SurfaceId};
use crate::math::Point3;
use crate::pool::{self, Worker, WorkerContext, WorkerPool};
use crate::progress::{CancelToken, ProgressSink, Stage};

use super::{Aabb, DrawingVolume};

/// Half-width of the first trial box on an unbounded side.
const INITIAL_EXTENT: f64 = 10.0;
/// Trial extents beyond this are treated as infinite.
const MAX_EXTENT: f64 = 1.0e6;
/// Samples per axis on each probed face.
const SHELL_SAMPLES: usize = 16;
/// Samples per axis when looking for any interior point of the trial box.
const INTERIOR_SAMPLES: usize = 8;

/// Why a cell was left out of the drawing volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// The cell keeps reaching the trial box up to the growth limit.
    Unbounded,
    /// No interior point was found before the growth limit.
    Unresolved,
    /// The per-cell time budget ran out.
    TimedOut,
    /// The cell's region is empty.
    Empty,
}

/// Result of one cell's estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellEstimate {
    Bounded(Aabb),
    Excluded(Exclusion),
}

/// Drawing volume estimated from the model.
#[derive(Debug, Clone)]
pub struct BoundsReport {
    volume: DrawingVolume,
    bounded: Vec<CellId>,
    excluded: Vec<(CellId, Exclusion)>,
}

impl BoundsReport {
    #[must_use]
    pub fn volume(&self) -> &DrawingVolume {
        &self.volume
    }

    /// Cells that contributed to the volume.
    #[must_use]
    pub fn bounded(&self) -> &[CellId] {
        &self.bounded
    }

    /// Cells left out of the volume, in model order.
    #[must_use]
    pub fn excluded(&self) -> &[(CellId, Exclusion)] {
        &self.excluded
    }
}

/// Estimates a finite drawing volume covering every boundable cell.
///
/// Each cell is processed independently within `budget`; cells that cannot
/// be bounded are excluded and reported. Successful boxes are cached on the
/// cells.
pub struct BoundingBoxCalculator<'a> {
    model: &'a GeometryModel,
    pool: &'a WorkerPool,
    budget: Duration,
}

impl<'a> BoundingBoxCalculator<'a> {
    #[must_use]
    pub fn new(model: &'a GeometryModel, pool: &'a WorkerPool, budget: Duration) -> Self {
        Self {
            model,
            pool,
            budget,
        }
    }

    /// Runs the estimation.
    ///
    /// # Errors
    ///
    /// Returns [`EstimationError::Failed`] if no cell could be bounded and
    /// [`EstimationError::Cancelled`] if `cancel` fires.
    pub fn execute(
        &self,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Result<BoundsReport> {
        let ids = self.model.cell_ids();
        let worker = CellBoundsWorker {
            model: self.model,
            ids,
            budget: self.budget,
        };
        let reports = self
            .pool
            .run(&worker, ids.len(), cancel, progress, Stage::BoundingBoxes);
        let estimates = pool::collect(reports, || EstimationError::Cancelled.into())?;

        let mut union = Aabb::empty();
        let mut bounded = Vec::new();
        let mut excluded = Vec::new();
        for (id, estimate) in estimates {
            match estimate {
                CellEstimate::Bounded(b) => {
                    union = union.union(&b);
                    bounded.push(id);
                }
                CellEstimate::Excluded(reason) => {
                    let name = self
                        .model
                        .cell(id)
                        .map(|c| c.name().to_owned())
                        .unwrap_or_default();
                    warn!(cell = %name, ?reason, "cell excluded from drawing volume");
                    excluded.push((id, reason));
                }
            }
        }

        if union.is_empty() {
            let names: Vec<_> = excluded
                .iter()
                .filter_map(|(id, _)| self.model.cell(*id).ok().map(|c| c.name().to_owned()))
                .collect();
            let cells = if names.is_empty() {
                "(no cells)".to_owned()
            } else {
                names.join(", ")
            };
            return Err(EstimationError::Failed { cells }.into());
        }

        let volume = DrawingVolume::from_aabb(union)?;
        debug!(
            min = ?volume.min(),
            max = ?volume.max(),
            bounded = bounded.len(),
            "drawing volume estimated"
        );
        Ok(BoundsReport {
            volume,
            bounded,
            excluded,
        })
    }
}

struct CellBoundsWorker<'a> {
    model: &'a GeometryModel,
    ids: &'a [CellId],
    budget: Duration,
}

impl Worker for CellBoundsWorker<'_> {
    type Output = (CellId, CellEstimate);

    fn process(
        &self,
        index: usize,
        ctx: &WorkerContext<'_>,
        out: &mut Vec<Self::Output>,
    ) -> Result<()> {
        let id = self.ids[index];
        let cell = self.model.cell(id)?;
        if let Some(cached) = cell.cached_bounds() {
            out.push((id, CellEstimate::Bounded(*cached)));
            return Ok(());
        }
        let deadline = Instant::now() + self.budget;
        let estimate = estimate_expr(self.model, cell.expr(), deadline, ctx)?;
        if let CellEstimate::Bounded(b) = estimate {
            cell.cache_bounds(b);
        }
        trace!(cell = cell.name(), ?estimate, "cell estimated");
        out.push((id, estimate));
        Ok(())
    }
}

/// Conservative bounds read off the expression tree without sampling.
#[must_use]
pub fn rough_bounds(model: &GeometryModel, expr: &CellExpr) -> Aabb {
    match expr {
        CellExpr::Halfspace { surface, sense } => side_bounds(model, *surface, *sense),
        CellExpr::Intersection(items) => items
            .iter()
            .fold(Aabb::universal(), |acc, e| acc.intersection(&rough_bounds(model, e))),
        CellExpr::Union(items) => items
            .iter()
            .fold(Aabb::empty(), |acc, e| acc.union(&rough_bounds(model, e))),
        CellExpr::Complement(inner) => match inner.as_ref() {
            CellExpr::Halfspace { surface, sense } => side_bounds(model, *surface, sense.flipped()),
            CellExpr::Complement(e) => rough_bounds(model, e),
            _ => Aabb::universal(),
        },
        CellExpr::Cell(id) => model.cell(*id).map_or(Aabb::universal(), |c| {
            c.cached_bounds()
                .copied()
                .unwrap_or_else(|| rough_bounds(model, c.expr()))
        }),
    }
}

fn side_bounds(model: &GeometryModel, surface: SurfaceId, sense: Sense) -> Aabb {
    model.surface(surface).map_or(Aabb::universal(), |s| match sense {
        Sense::Negative => s.negative_bounds(),
        Sense::Positive => s.positive_bounds(),
    })
}

/// Bounds one expression: analytic bounds first, then outward shell
/// sampling on every side the analysis left open.
///
/// # Errors
///
/// Returns [`EstimationError::Cancelled`] when the request is cancelled.
pub(crate) fn estimate_expr(
    model: &GeometryModel,
    expr: &CellExpr,
    deadline: Instant,
    ctx: &WorkerContext<'_>,
) -> Result<CellEstimate> {
    let rough = rough_bounds(model, expr);
    if rough.is_empty() {
        return Ok(CellEstimate::Excluded(Exclusion::Empty));
    }
    if rough.is_finite() {
        return Ok(CellEstimate::Bounded(rough));
    }

    let inside = |p: &Point3| model.expr_value(expr, p) <= 0.0;
    let mut extent = INITIAL_EXTENT;
    loop {
        if ctx.should_stop() {
            return Err(EstimationError::Cancelled.into());
        }
        if Instant::now() >= deadline {
            return Ok(CellEstimate::Excluded(Exclusion::TimedOut));
        }
        if extent > MAX_EXTENT {
            return Ok(CellEstimate::Excluded(Exclusion::Unbounded));
        }

        let trial = trial_box(&rough, extent);
        let mut touches_open_face = false;
        for axis in 0..3 {
            for upper in [false, true] {
                let open = if upper {
                    rough.max[axis].is_infinite()
                } else {
                    rough.min[axis].is_infinite()
                };
                if open && face_hit(&trial, axis, upper, &inside) {
                    touches_open_face = true;
                }
            }
            if Instant::now() >= deadline {
                return Ok(CellEstimate::Excluded(Exclusion::TimedOut));
            }
        }

        if !touches_open_face {
            if interior_hit(&trial, &inside) {
                return Ok(CellEstimate::Bounded(trial));
            }
            if extent * 2.0 > MAX_EXTENT {
                return Ok(CellEstimate::Excluded(Exclusion::Unresolved));
            }
        }
        extent *= 2.0;
    }
}

/// Closes every open side of `rough` at `extent` from its finite side, or from the origin.
fn trial_box(rough: &Aabb, extent: f64) -> Aabb {
    let mut b = *rough;
    for i in 0..3 {
        let (lo, hi) = (rough.min[i], rough.max[i]);
        if lo.is_infinite() {
            b.min[i] = if hi.is_finite() { hi.min(0.0) - extent } else { -extent };
        }
        if hi.is_infinite() {
            b.max[i] = if lo.is_finite() { lo.max(0.0) + extent } else { extent };
        }
    }
    b
}

#[allow(clippy::cast_precision_loss)]
fn lerp(lo: f64, hi: f64, i: usize, n: usize) -> f64 {
    lo + (hi - lo) * (i as f64 + 0.5) / n as f64
}

fn face_hit(b: &Aabb, axis: usize, upper: bool, inside: &impl Fn(&Point3) -> bool) -> bool {
    let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
    let fixed = if upper { b.max[axis] } else { b.min[axis] };
    (0..SHELL_SAMPLES).any(|i| {
        (0..SHELL_SAMPLES).any(|j| {
            let mut p = Point3::origin();
            p[axis] = fixed;
            p[u] = lerp(b.min[u], b.max[u], i, SHELL_SAMPLES);
            p[v] = lerp(b.min[v], b.max[v], j, SHELL_SAMPLES);
            inside(&p)
        })
    })
}

fn interior_hit(b: &Aabb, inside: &impl Fn(&Point3) -> bool) -> bool {
    let n = INTERIOR_SAMPLES;
    (0..n).any(|i| {
        (0..n).any(|j| {
            (0..n).any(|k| {
                let p = Point3::new(
                    lerp(b.min.x, b.max.x, i, n),
                    lerp(b.min.y, b.max.y, j, n),
                    lerp(b.min.z, b.max.z, k, n),
                );
                inside(&p)
            })
        })
    })
}
