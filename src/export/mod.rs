//! Mesh export to interchange formats.
//!
//! Every writer takes a [`MeshView`] and any `Write` sink, so the exporter
//! owns file handling and cancellation while the writers only lay out bytes.

mod ply;
mod stl;
mod vtk;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::error::{ExportError, Result};
use crate::geometry::{CellId, GeometryModel};
use crate::progress::{CancelToken, ProgressSink, Stage};
use crate::tessellation::{MeshSet, PolygonMesh};

/// File stem of the single file written in unified mode.
const UNIFIED_STEM: &str = "unified";

/// Supported 3D mesh formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format3D {
    /// VTK XML poly data.
    Vtp,
    /// Legacy ASCII VTK poly data.
    Vtk,
    /// Binary STL.
    Stl,
    /// ASCII PLY.
    Ply,
}

impl Format3D {
    pub const ALL: [Self; 4] = [Self::Vtp, Self::Vtk, Self::Stl, Self::Ply];

    /// File extension without the leading dot.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Vtp => "vtp",
            Self::Vtk => "vtk",
            Self::Stl => "stl",
            Self::Ply => "ply",
        }
    }

    /// Whether faces carry a `cell_index` attribute.
    #[must_use]
    pub fn has_cell_index(self) -> bool {
        !matches!(self, Self::Stl)
    }

    fn write(self, view: &MeshView<'_>, out: &mut impl Write) -> std::io::Result<()> {
        match self {
            Self::Vtp => vtk::write_xml(view, out),
            Self::Vtk => vtk::write_legacy(view, out),
            Self::Stl => stl::write(view, out),
            Self::Ply => ply::write(view, out),
        }
    }
}

impl fmt::Display for Format3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for Format3D {
    type Err = ExportError;

    /// Parses a format identifier such as `stl` or `.VTP`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let id = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.suffix() == id)
            .ok_or_else(|| ExportError::UnsupportedFormat(s.to_owned()))
    }
}

/// A mesh prepared for writing: scaled coordinates and per-face cell indices.
pub(crate) struct MeshView<'a> {
    pub title: &'a str,
    pub vertices: Vec<[f64; 3]>,
    pub faces: &'a [[u32; 3]],
    /// Insertion index of each face's cell in the model, `-1` if unknown.
    pub cell_index: Vec<i64>,
}

/// Insertion index of every cell of `model`.
fn cell_indices(model: &GeometryModel) -> HashMap<CellId, i64> {
    model
        .cell_ids()
        .iter()
        .zip(0_i64..)
        .map(|(&id, i)| (id, i))
        .collect()
}

impl<'a> MeshView<'a> {
    fn new(
        indices: &HashMap<CellId, i64>,
        mesh: &'a PolygonMesh,
        title: &'a str,
        scale: f64,
    ) -> Self {
        Self {
            title,
            vertices: mesh
                .vertices
                .iter()
                .map(|v| [v.x * scale, v.y * scale, v.z * scale])
                .collect(),
            faces: &mesh.faces,
            cell_index: mesh
                .face_cells
                .iter()
                .map(|id| indices.get(id).copied().unwrap_or(-1))
                .collect(),
        }
    }

    pub fn triangle(&self, face: &[u32; 3]) -> [[f64; 3]; 3] {
        face.map(|v| self.vertices[v as usize])
    }
}

/// Writes constructed meshes to files, one per cell or one unified file.
#[derive(Debug, Clone)]
pub struct Cell3DExporter {
    format: Format3D,
    dir: PathBuf,
    scale: f64,
    unify: bool,
}

impl Cell3DExporter {
    #[must_use]
    pub fn new(format: Format3D, dir: impl Into<PathBuf>) -> Self {
        Self {
            format,
            dir: dir.into(),
            scale: 1.0,
            unify: false,
        }
    }

    /// Multiplies every coordinate by `scale` on output.
    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Writes all meshes into one file, keeping cells apart by face tag.
    #[must_use]
    pub fn unified(mut self, unify: bool) -> Self {
        self.unify = unify;
        self
    }

    #[must_use]
    pub fn format(&self) -> Format3D {
        self.format
    }

    /// Exports `meshes` and returns the written paths in write order.
    ///
    /// Empty meshes are skipped. In unified mode every mesh is one unit of
    /// progress while it is appended, and the single write is the last
    /// unit. On cancellation or failure every file written by this call is
    /// removed again, including a partially written one.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Io`] if the directory or a file cannot be
    /// written, [`ExportError::Cancelled`] if `cancel` fires and
    /// `MeshTooLarge` if a unified mesh outgrows 32-bit indices.
    pub fn export(
        &self,
        model: &GeometryModel,
        meshes: &MeshSet,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir).map_err(ExportError::from)?;

        let unified;
        let mut done = 0;
        let jobs: Vec<(String, &PolygonMesh)> = if self.unify {
            let total = meshes.meshes().len() + 1;
            progress.begin(Stage::Exporting, total);
            unified = meshes.unified_with(|i| {
                if i > 0 {
                    progress.advance(i, total);
                }
                if cancel.is_cancelled() {
                    debug!(appended = i, "export cancelled while unifying");
                    return Err(ExportError::Cancelled.into());
                }
                Ok(())
            })?;
            done = total - 1;
            progress.advance(done, total);
            vec![(UNIFIED_STEM.to_owned(), &unified)]
        } else {
            let mut taken = HashSet::new();
            let jobs: Vec<_> = meshes
                .meshes()
                .iter()
                .filter(|m| !m.is_empty())
                .map(|m| {
                    let name = m
                        .cell
                        .and_then(|id| model.cell(id).ok())
                        .map_or("cell", |c| c.name());
                    (unique_stem(&sanitize(name), &mut taken), m)
                })
                .collect();
            progress.begin(Stage::Exporting, jobs.len());
            jobs
        };
        let total = done + jobs.len();

        let indices = cell_indices(model);
        let mut written = Vec::with_capacity(jobs.len());
        for (stem, mesh) in &jobs {
            if cancel.is_cancelled() {
                remove_all(&written);
                debug!(removed = written.len(), "export cancelled");
                return Err(ExportError::Cancelled.into());
            }
            let path = self.dir.join(format!("{stem}.{}", self.format.suffix()));
            let view = MeshView::new(&indices, mesh, stem, self.scale);
            if let Err(e) = write_file(&path, |out| self.format.write(&view, out)) {
                remove_all(&written);
                return Err(e.into());
            }
            debug!(path = %path.display(), faces = mesh.faces.len(), "mesh written");
            written.push(path);
            done += 1;
            progress.advance(done, total);
        }
        info!(files = written.len(), format = %self.format, "cells exported");
        Ok(written)
    }
}

/// Creates `path` and fills it through `body`. A file left behind by a
/// failed write is removed.
fn write_file(
    path: &Path,
    body: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> std::result::Result<(), ExportError> {
    let result = File::create(path).and_then(|file| {
        let mut out = BufWriter::new(file);
        body(&mut out)?;
        out.flush()
    });
    if let Err(e) = result {
        if path.is_file() {
            remove_all(&[path.to_path_buf()]);
        }
        return Err(e.into());
    }
    Ok(())
}

fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "could not remove partial export");
        }
    }
}

/// Replaces every character that is unsafe in a file name with `_`.
fn sanitize(name: &str) -> String {
    let clean: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let clean = clean.trim_start_matches('.');
    if clean.is_empty() {
        "cell".to_owned()
    } else {
        clean.to_owned()
    }
}

fn unique_stem(stem: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = stem.to_owned();
    let mut n = 1;
    while !taken.insert(candidate.clone()) {
        n += 1;
        candidate = format!("{stem}_{n}");
    }
    candidate
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::bounds::DrawingVolume;
    use crate::error::CelltraceError;
    use crate::geometry::{Cell, CellExpr, Sphere};
    use crate::math::Point3;
    use crate::pool::WorkerPool;
    use crate::progress::NoProgress;
    use crate::tessellation::{MeshSettings, PolyConstructor};

    /// Cancels `token` once `at` units are reported done.
    struct CancelAt {
        at: usize,
        token: CancelToken,
        done: Mutex<Vec<usize>>,
    }

    impl CancelAt {
        fn new(at: usize, token: &CancelToken) -> Self {
            Self {
                at,
                token: token.clone(),
                done: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProgressSink for CancelAt {
        fn begin(&self, _stage: Stage, _total: usize) {}

        fn advance(&self, done: usize, _total: usize) {
            self.done.lock().unwrap().push(done);
            if done >= self.at {
                self.token.cancel();
            }
        }
    }

    fn two_balls() -> (GeometryModel, MeshSet) {
        let mut m = GeometryModel::new();
        let a = m.add_surface("a", Sphere::new(Point3::new(-1.5, 0.0, 0.0), 1.0).unwrap()).unwrap();
        let b = m.add_surface("b", Sphere::new(Point3::new(1.5, 0.0, 0.0), 1.0).unwrap()).unwrap();
        m.add_cell(Cell::new("left ball", "fe", CellExpr::negative(a))).unwrap();
        m.add_cell(Cell::new("right/ball", "pb", CellExpr::negative(b))).unwrap();
        let pool = WorkerPool::new(2).unwrap();
        let settings = MeshSettings {
            points_per_cell: 400,
            ..MeshSettings::default()
        };
        let region = DrawingVolume::from_ranges([-3.0, 3.0, -2.0, 2.0, -2.0, 2.0]).unwrap();
        let set = PolyConstructor::new(&m, &pool, &settings, region)
            .execute(&CancelToken::new(), &NoProgress)
            .unwrap();
        (m, set)
    }

    #[test]
    fn format_identifiers() {
        assert_eq!("STL".parse::<Format3D>().unwrap(), Format3D::Stl);
        assert_eq!(".vtp".parse::<Format3D>().unwrap(), Format3D::Vtp);
        let err = "obj".parse::<Format3D>().unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedFormat(ref s) if s == "obj"));
    }

    #[test]
    fn file_names_are_sanitized_and_unique() {
        let mut taken = HashSet::new();
        assert_eq!(unique_stem(&sanitize("a b"), &mut taken), "a_b");
        assert_eq!(unique_stem(&sanitize("a/b"), &mut taken), "a_b_2");
        assert_eq!(sanitize("../x"), "_x");
        assert_eq!(sanitize(""), "cell");
    }

    #[test]
    fn per_cell_stl_files() {
        let (m, set) = two_balls();
        let dir = tempfile::tempdir().unwrap();
        let paths = Cell3DExporter::new(Format3D::Stl, dir.path())
            .export(&m, &set, &CancelToken::new(), &NoProgress)
            .unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["left_ball.stl", "right_ball.stl"]);

        let mut file = File::open(&paths[0]).unwrap();
        let stl = stl_io::read_stl(&mut file).unwrap();
        assert_eq!(stl.faces.len(), set.meshes()[0].faces.len());
        assert!(stl.vertices.iter().all(|v| v[0] < 0.0));
    }

    #[test]
    fn unified_vtk_carries_cell_index() {
        let (m, set) = two_balls();
        let dir = tempfile::tempdir().unwrap();
        let paths = Cell3DExporter::new(Format3D::Vtk, dir.path())
            .unified(true)
            .with_scale(10.0)
            .export(&m, &set, &CancelToken::new(), &NoProgress)
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("unified.vtk"));
        let text = fs::read_to_string(&paths[0]).unwrap();
        let faces: usize = set.meshes().iter().map(|m| m.faces.len()).sum();
        assert!(text.contains(&format!("POLYGONS {faces} {}", faces * 4)));
        assert!(text.contains("SCALARS cell_index int 1"));
        let tags: Vec<&str> = text
            .lines()
            .skip_while(|l| !l.starts_with("LOOKUP_TABLE"))
            .skip(1)
            .collect();
        assert_eq!(tags.len(), faces);
        assert!(tags.contains(&"0") && tags.contains(&"1"));
    }

    #[test]
    fn every_format_writes_a_file() {
        let (m, set) = two_balls();
        let dir = tempfile::tempdir().unwrap();
        for format in Format3D::ALL {
            let paths = Cell3DExporter::new(format, dir.path().join(format.suffix()))
                .export(&m, &set, &CancelToken::new(), &NoProgress)
                .unwrap();
            assert_eq!(paths.len(), 2);
            assert!(paths.iter().all(|p| fs::metadata(p).unwrap().len() > 0));
        }
    }

    #[test]
    fn cancelled_export_leaves_no_files() {
        let (m, set) = two_balls();
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = Cell3DExporter::new(Format3D::Ply, dir.path())
            .export(&m, &set, &cancel, &NoProgress)
            .unwrap_err();
        assert!(matches!(err, CelltraceError::Export(ExportError::Cancelled)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn unknown_face_cells_get_negative_index() {
        let m = GeometryModel::new();
        let mesh = PolygonMesh {
            vertices: vec![Point3::origin(); 3],
            faces: vec![[0, 1, 2]],
            face_cells: vec![CellId::default()],
            ..PolygonMesh::default()
        };
        let view = MeshView::new(&cell_indices(&m), &mesh, "t", 2.0);
        assert_eq!(view.cell_index, vec![-1]);
        assert_eq!(view.vertices[0], [0.0; 3]);
    }

    #[test]
    fn cancel_after_first_file_removes_it() {
        let (m, set) = two_balls();
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        let sink = CancelAt::new(1, &cancel);
        let err = Cell3DExporter::new(Format3D::Stl, dir.path())
            .export(&m, &set, &cancel, &sink)
            .unwrap_err();
        assert!(matches!(err, CelltraceError::Export(ExportError::Cancelled)));
        assert_eq!(*sink.done.lock().unwrap(), vec![1]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn unified_export_stops_between_cells() {
        let (m, set) = two_balls();
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        let sink = CancelAt::new(1, &cancel);
        let err = Cell3DExporter::new(Format3D::Vtp, dir.path())
            .unified(true)
            .export(&m, &set, &cancel, &sink)
            .unwrap_err();
        assert!(err.is_cancelled());
        // The second cell is never appended and nothing reaches the disk.
        assert_eq!(*sink.done.lock().unwrap(), vec![1]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn unified_progress_counts_cells_then_the_write() {
        let (m, set) = two_balls();
        let dir = tempfile::tempdir().unwrap();
        let sink = CancelAt::new(usize::MAX, &CancelToken::new());
        Cell3DExporter::new(Format3D::Ply, dir.path())
            .unified(true)
            .export(&m, &set, &CancelToken::new(), &sink)
            .unwrap();
        assert_eq!(*sink.done.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("half.ply");
        let err = write_file(&path, |out| {
            out.write_all(b"ply\nformat ascii 1.0\n")?;
            out.flush()?;
            Err(std::io::Error::other("disk full"))
        })
        .unwrap_err();
        assert!(matches!(err, ExportError::Io(_)));
        assert!(!path.exists());
    }

    #[test]
    fn failed_export_removes_earlier_files() {
        let (m, set) = two_balls();
        let dir = tempfile::tempdir().unwrap();
        // A directory in the way of the second file makes its creation fail.
        fs::create_dir(dir.path().join("right_ball.stl")).unwrap();
        let err = Cell3DExporter::new(Format3D::Stl, dir.path())
            .export(&m, &set, &CancelToken::new(), &NoProgress)
            .unwrap_err();
        assert!(matches!(err, CelltraceError::Export(ExportError::Io(_))));
        let left: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from("right_ball.stl")]);
    }
}
