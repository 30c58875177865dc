use std::collections::HashMap;

use crate::bounds::Aabb;
use crate::error::{OperationError, Result};
use crate::math::{Point3, Vector3};

/// Maximum bisection steps when placing a boundary vertex on a grid edge.
const MAX_BISECTIONS: usize = 64;

/// Unit-cube corner offsets.
const CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Split of the unit cube into six tetrahedra around the 0-6 diagonal.
/// Every cube uses the same diagonal, so neighboring cubes share faces.
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 5, 1, 6],
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
];

/// Implicit-function values on a regular lattice.
#[derive(Debug, Clone)]
pub struct SampleGrid {
    origin: Point3,
    step: Vector3,
    dims: [usize; 3],
    values: Vec<f64>,
}

impl SampleGrid {
    /// Samples `f` on a `dims` lattice spanning `bounds` (corners included).
    ///
    /// # Errors
    ///
    /// Returns `ConstructionCancelled` if `should_stop` turns true between slabs.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample(
        bounds: &Aabb,
        dims: [usize; 3],
        f: &impl Fn(&Point3) -> f64,
        should_stop: &impl Fn() -> bool,
    ) -> Result<Self> {
        let dims = dims.map(|d| d.max(2));
        let extent = bounds.extent();
        let step = Vector3::new(
            extent.x / (dims[0] - 1) as f64,
            extent.y / (dims[1] - 1) as f64,
            extent.z / (dims[2] - 1) as f64,
        );
        let mut grid = Self {
            origin: bounds.min,
            step,
            dims,
            values: Vec::with_capacity(dims[0] * dims[1] * dims[2]),
        };
        for k in 0..dims[2] {
            if should_stop() {
                return Err(OperationError::ConstructionCancelled.into());
            }
            for j in 0..dims[1] {
                for i in 0..dims[0] {
                    let p = grid.point(i, j, k);
                    grid.values.push(f(&p));
                }
            }
        }
        Ok(grid)
    }

    #[must_use]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn point(&self, i: usize, j: usize, k: usize) -> Point3 {
        self.origin
            + Vector3::new(
                i as f64 * self.step.x,
                j as f64 * self.step.y,
                k as f64 * self.step.z,
            )
    }

    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dims[1] + j) * self.dims[0] + i
    }

    fn unindex(&self, idx: usize) -> Point3 {
        let i = idx % self.dims[0];
        let j = (idx / self.dims[0]) % self.dims[1];
        let k = idx / (self.dims[0] * self.dims[1]);
        self.point(i, j, k)
    }
}

/// Extracts the zero level set of `f` from `grid` by marching tetrahedra.
///
/// Boundary vertices are placed by bisecting `f` along lattice edges until
/// the bracket is shorter than `tolerance`. Triangles are oriented with their
/// normals pointing from the inside (`f <= 0`) to the outside.
///
/// # Errors
///
/// Returns `ConstructionCancelled` if `should_stop` turns true between slabs.
pub fn extract_surface(
    grid: &SampleGrid,
    f: &impl Fn(&Point3) -> f64,
    tolerance: f64,
    should_stop: &impl Fn() -> bool,
) -> Result<(Vec<Point3>, Vec<[u32; 3]>)> {
    let [nx, ny, nz] = grid.dims;
    let mut extractor = Extractor {
        grid,
        f,
        tolerance: tolerance.max(f64::EPSILON),
        vertices: Vec::new(),
        faces: Vec::new(),
        edge_vertex: HashMap::new(),
    };
    for k in 0..nz - 1 {
        if should_stop() {
            return Err(OperationError::ConstructionCancelled.into());
        }
        for j in 0..ny - 1 {
            for i in 0..nx - 1 {
                let corners = CORNERS.map(|[di, dj, dk]| grid.index(i + di, j + dj, k + dk));
                for tet in TETRAHEDRA {
                    extractor.tetrahedron(tet.map(|c| corners[c]));
                }
            }
        }
    }
    Ok((extractor.vertices, extractor.faces))
}

struct Extractor<'a, F> {
    grid: &'a SampleGrid,
    f: &'a F,
    tolerance: f64,
    vertices: Vec<Point3>,
    faces: Vec<[u32; 3]>,
    edge_vertex: HashMap<(usize, usize), u32>,
}

impl<F: Fn(&Point3) -> f64> Extractor<'_, F> {
    fn tetrahedron(&mut self, ids: [usize; 4]) {
        let (inside, outside): (Vec<usize>, Vec<usize>) =
            ids.into_iter().partition(|&id| self.grid.values[id] <= 0.0);
        match (inside.as_slice(), outside.as_slice()) {
            ([i], [a, b, c]) => {
                let tri = [self.edge(*i, *a), self.edge(*i, *b), self.edge(*i, *c)];
                self.emit(tri, &inside, &outside);
            }
            ([a, b, c], [o]) => {
                let tri = [self.edge(*a, *o), self.edge(*b, *o), self.edge(*c, *o)];
                self.emit(tri, &inside, &outside);
            }
            ([i0, i1], [o0, o1]) => {
                let quad = [
                    self.edge(*i0, *o0),
                    self.edge(*i0, *o1),
                    self.edge(*i1, *o1),
                    self.edge(*i1, *o0),
                ];
                self.emit([quad[0], quad[1], quad[2]], &inside, &outside);
                self.emit([quad[0], quad[2], quad[3]], &inside, &outside);
            }
            _ => {}
        }
    }

    /// Vertex on the lattice edge between an inside and an outside sample.
    fn edge(&mut self, inside: usize, outside: usize) -> u32 {
        let key = (inside.min(outside), inside.max(outside));
        if let Some(&v) = self.edge_vertex.get(&key) {
            return v;
        }
        let (mut lo, mut hi) = (self.grid.unindex(inside), self.grid.unindex(outside));
        for _ in 0..MAX_BISECTIONS {
            if (hi - lo).norm() <= self.tolerance {
                break;
            }
            let mid = nalgebra::center(&lo, &hi);
            if (self.f)(&mid) <= 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let id = u32::try_from(self.vertices.len()).unwrap_or(u32::MAX);
        self.vertices.push(nalgebra::center(&lo, &hi));
        self.edge_vertex.insert(key, id);
        id
    }

    #[allow(clippy::cast_precision_loss)]
    fn emit(&mut self, mut tri: [u32; 3], inside: &[usize], outside: &[usize]) {
        let mean = |ids: &[usize]| {
            ids.iter()
                .fold(Vector3::zeros(), |acc, &id| acc + self.grid.unindex(id).coords)
                / ids.len() as f64
        };
        let outward = mean(outside) - mean(inside);
        let [a, b, c] = tri.map(|v| self.vertices[v as usize]);
        if (b - a).cross(&(c - a)).dot(&outward) < 0.0 {
            tri.swap(1, 2);
        }
        self.faces.push(tri);
    }
}
