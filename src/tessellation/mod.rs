mod construct;
mod march;
mod sampling;

pub use construct::PolyConstructor;
pub use march::{extract_surface, SampleGrid};
pub use sampling::{
    fit_to_memory, grid_dims, required_memory_mb, MAX_SAMPLES_PER_AXIS, MIN_SAMPLES_PER_AXIS,
};

use crate::bounds::DrawingVolume;
use crate::error::{OperationError, Result};
use crate::geometry::CellId;
use crate::math::{Point3, Vector3};

/// A plane cutting away one side of every constructed mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutPlane {
    point: Point3,
    normal: Vector3,
}

impl CutPlane {
    /// Keeps the side the normal points away from. Returns `None` for a zero normal.
    #[must_use]
    pub fn new(point: Point3, normal: Vector3) -> Option<Self> {
        crate::math::unit(&normal).map(|normal| Self { point, normal })
    }

    /// Signed distance; positive on the removed side.
    #[must_use]
    pub fn value(&self, p: &Point3) -> f64 {
        self.normal.dot(&(p - self.point))
    }
}

/// Parameters controlling polygon construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshSettings {
    /// Requested number of implicit-function samples per cell.
    pub points_per_cell: usize,
    /// Exponent of the cell-volume correction of the sample count.
    pub smoothing_factor: f64,
    /// Share of `memory_budget_mb` the sample grids may use, in percent.
    pub memory_limit_percent: f64,
    /// Memory available to construction, in MB.
    pub memory_budget_mb: f64,
    /// Boundary vertices lie within this distance of the analytic surface.
    pub tolerance: f64,
    pub cut_planes: Vec<CutPlane>,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            points_per_cell: 10_000,
            smoothing_factor: 0.4,
            memory_limit_percent: 90.0,
            memory_budget_mb: 4096.0,
            tolerance: 1e-6,
            cut_planes: Vec::new(),
        }
    }
}

/// A triangle mesh of one cell boundary, or of several cells when unified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolygonMesh {
    /// The cell this mesh belongs to; `None` for a unified mesh.
    pub cell: Option<CellId>,
    pub vertices: Vec<Point3>,
    /// Triangles, counter-clockwise seen from outside the cell.
    pub faces: Vec<[u32; 3]>,
    /// Owning cell of each face.
    pub face_cells: Vec<CellId>,
    /// Effective points per cell used for this mesh.
    pub points_per_cell: usize,
    /// Number of implicit-function samples taken.
    pub sample_count: usize,
}

impl PolygonMesh {
    #[must_use]
    pub fn is_unified(&self) -> bool {
        self.cell.is_none()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// The three corner positions of face `i`.
    #[must_use]
    pub fn triangle(&self, i: usize) -> Option<[Point3; 3]> {
        let f = self.faces.get(i)?;
        Some(f.map(|v| self.vertices[v as usize]))
    }

    /// Appends `other`, keeping each face's cell tag.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::MeshTooLarge`] if the combined vertices no
    /// longer fit `u32` indices; `self` is left unchanged.
    pub fn append(&mut self, other: &Self) -> Result<()> {
        let offset = index_offset(self.vertices.len(), other.vertices.len())?;
        self.vertices.extend_from_slice(&other.vertices);
        self.faces
            .extend(other.faces.iter().map(|f| f.map(|v| v + offset)));
        self.face_cells.extend_from_slice(&other.face_cells);
        self.sample_count += other.sample_count;
        Ok(())
    }
}

/// Index offset of vertices appended after `len` existing ones, checking
/// that all `len + extra` vertices stay addressable by `u32`.
fn index_offset(len: usize, extra: usize) -> Result<u32> {
    let vertices = len.saturating_add(extra);
    match (u32::try_from(len), u32::try_from(vertices)) {
        (Ok(offset), Ok(_)) => Ok(offset),
        _ => Err(OperationError::MeshTooLarge { vertices }.into()),
    }
}

/// The meshes of one construction request.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshSet {
    meshes: Vec<PolygonMesh>,
    settings: MeshSettings,
    region: DrawingVolume,
}

impl MeshSet {
    pub(crate) fn new(
        meshes: Vec<PolygonMesh>,
        settings: MeshSettings,
        region: DrawingVolume,
    ) -> Self {
        Self {
            meshes,
            settings,
            region,
        }
    }

    /// Per-cell meshes in model order.
    #[must_use]
    pub fn meshes(&self) -> &[PolygonMesh] {
        &self.meshes
    }

    #[must_use]
    pub fn settings(&self) -> &MeshSettings {
        &self.settings
    }

    #[must_use]
    pub fn region(&self) -> &DrawingVolume {
        &self.region
    }

    #[must_use]
    pub fn get(&self, cell: CellId) -> Option<&PolygonMesh> {
        self.meshes.iter().find(|m| m.cell == Some(cell))
    }

    /// Concatenates every mesh into one; cells stay distinguishable by face tag.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::MeshTooLarge`] if the result exceeds `u32`
    /// vertex indices.
    pub fn unified(&self) -> Result<PolygonMesh> {
        self.unified_with(|_| Ok(()))
    }

    /// As [`MeshSet::unified`], calling `step` with the index of each mesh
    /// before it is appended. An error from `step` aborts the concatenation.
    ///
    /// # Errors
    ///
    /// Returns the first error of `step` or of [`PolygonMesh::append`].
    pub fn unified_with(&self, mut step: impl FnMut(usize) -> Result<()>) -> Result<PolygonMesh> {
        let mut out = PolygonMesh {
            points_per_cell: self.settings.points_per_cell,
            ..PolygonMesh::default()
        };
        for (i, mesh) in self.meshes.iter().enumerate() {
            step(i)?;
            out.append(mesh)?;
        }
        Ok(out)
    }
}
