use tracing::{debug, info, trace};

use crate::bounds::{rough_bounds, Aabb, DrawingVolume};
use crate::error::{OperationError, Result};
use crate::geometry::{CellId, GeometryModel};
use crate::math::Point3;
use crate::pool::{self, Worker, WorkerContext, WorkerPool};
use crate::progress::{CancelToken, ProgressSink, Stage};

use super::march::{extract_surface, SampleGrid};
use super::sampling::{fit_to_memory, grid_dims};
use super::{MeshSet, MeshSettings, PolygonMesh};

/// Margin added around a cell's bounds so its boundary never touches the grid edge.
const BOUNDS_OFFSET: f64 = 1.01;

/// Builds boundary meshes for every visible cell, one cell per unit of work.
///
/// Each mesh is the zero level set of the cell's implicit value clipped to
/// the drawing region and the cut planes.
pub struct PolyConstructor<'a> {
    model: &'a GeometryModel,
    pool: &'a WorkerPool,
    settings: &'a MeshSettings,
    region: DrawingVolume,
    previous: Option<&'a MeshSet>,
}

impl<'a> PolyConstructor<'a> {
    #[must_use]
    pub fn new(
        model: &'a GeometryModel,
        pool: &'a WorkerPool,
        settings: &'a MeshSettings,
        region: DrawingVolume,
    ) -> Self {
        Self {
            model,
            pool,
            settings,
            region,
            previous: None,
        }
    }

    /// Reuses meshes of `previous` when it was built with the same settings and region.
    #[must_use]
    pub fn reuse(mut self, previous: &'a MeshSet) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Constructs the meshes.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionCancelled` if `cancel` fires before every cell is
    /// done, `MemoryLimit` if a cell's smallest grid exceeds the per-thread
    /// budget, and propagates worker failures.
    pub fn execute(&self, cancel: &CancelToken, progress: &dyn ProgressSink) -> Result<MeshSet> {
        let ids = self.model.visible_cells();
        let previous = self
            .previous
            .filter(|p| p.settings() == self.settings && *p.region() == self.region);
        let worker = CellMeshWorker {
            model: self.model,
            ids: &ids,
            settings: self.settings,
            region: self.region,
            previous,
            available_mb: self.available_mb(),
        };
        let reports = self
            .pool
            .run(&worker, ids.len(), cancel, progress, Stage::Constructing);
        let meshes = pool::collect(reports, || OperationError::ConstructionCancelled.into())?;

        info!(
            cells = meshes.len(),
            faces = meshes.iter().map(|m| m.faces.len()).sum::<usize>(),
            reused = previous.is_some(),
            "polygons constructed"
        );
        Ok(MeshSet::new(meshes, self.settings.clone(), self.region))
    }

    #[allow(clippy::cast_precision_loss)]
    fn available_mb(&self) -> f64 {
        self.settings.memory_budget_mb * self.settings.memory_limit_percent / 100.0
            / self.pool.threads() as f64
    }
}

struct CellMeshWorker<'a> {
    model: &'a GeometryModel,
    ids: &'a [CellId],
    settings: &'a MeshSettings,
    region: DrawingVolume,
    previous: Option<&'a MeshSet>,
    available_mb: f64,
}

impl CellMeshWorker<'_> {
    fn implicit(&self, id: CellId, p: &Point3) -> f64 {
        self.settings
            .cut_planes
            .iter()
            .map(|c| c.value(p))
            .fold(self.model.value(id, p).max(self.region.aabb().value(p)), f64::max)
    }

    fn sample_box(&self, id: CellId) -> Result<Aabb> {
        let cell = self.model.cell(id)?;
        let bounds = cell
            .cached_bounds()
            .copied()
            .unwrap_or_else(|| rough_bounds(self.model, cell.expr()));
        Ok(bounds.intersection(self.region.aabb()).expanded(BOUNDS_OFFSET))
    }
}

impl Worker for CellMeshWorker<'_> {
    type Output = PolygonMesh;

    fn process(
        &self,
        index: usize,
        ctx: &WorkerContext<'_>,
        out: &mut Vec<PolygonMesh>,
    ) -> Result<()> {
        let id = self.ids[index];
        if let Some(mesh) = self.previous.and_then(|p| p.get(id)) {
            out.push(mesh.clone());
            return Ok(());
        }

        let name = self.model.cell(id)?.name();
        let bounds = self.sample_box(id)?;
        if bounds.is_empty() {
            debug!(cell = name, "cell outside drawing region");
            out.push(PolygonMesh {
                cell: Some(id),
                points_per_cell: self.settings.points_per_cell,
                ..PolygonMesh::default()
            });
            return Ok(());
        }

        let smoothing = self.settings.smoothing_factor;
        let ppc = fit_to_memory(
            name,
            &bounds,
            self.settings.points_per_cell,
            smoothing,
            self.available_mb,
        )?;
        let dims = grid_dims(&bounds, ppc, smoothing);
        let f = |p: &Point3| self.implicit(id, p);
        let stop = || ctx.should_stop();
        let grid = SampleGrid::sample(&bounds, dims, &f, &stop)?;
        let (vertices, faces) = extract_surface(&grid, &f, self.settings.tolerance, &stop)?;

        trace!(cell = name, ?dims, faces = faces.len(), "cell meshed");
        out.push(PolygonMesh {
            cell: Some(id),
            face_cells: vec![id; faces.len()],
            vertices,
            faces,
            points_per_cell: ppc,
            sample_count: grid.sample_count(),
        });
        Ok(())
    }
}
