//! Request controller for one loaded geometry model.
//!
//! A [`Session`] runs one request at a time: every request method takes
//! `&mut self` and returns only after all of its workers have stopped.
//! Results are handed out as [`Outcome`]s and never partially populated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::bounds::{BoundingBoxCalculator, BoundsReport, DrawingVolume};
use crate::color::MaterialPalette;
use crate::config::EngineConfig;
use crate::error::{
    CelltraceError, EstimationError, ExportError, OperationError, Outcome, Result,
};
use crate::export::{Cell3DExporter, Format3D};
use crate::geometry::GeometryModel;
use crate::paint::{ColorImage, ColoredMesh, PolyPainter};
use crate::pool::WorkerPool;
use crate::progress::{CancelToken, ProgressSink};
use crate::section::{self, RenderedImage, SectionPlane, SectionRequest};
use crate::tessellation::{CutPlane, MeshSet, PolyConstructor};

/// Owns a geometry model, its configuration and the derived caches.
#[derive(Debug)]
pub struct Session {
    model: Arc<GeometryModel>,
    config: EngineConfig,
    pool: WorkerPool,
    bounds: Option<BoundsReport>,
    auto_disabled: bool,
    meshes: Option<MeshSet>,
    cut_planes: Vec<CutPlane>,
}

impl Session {
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings and
    /// `ThreadPool` if the worker threads cannot be spawned.
    pub fn new(model: GeometryModel, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.effective_threads())?;
        Ok(Self {
            model: Arc::new(model),
            config,
            pool,
            bounds: None,
            auto_disabled: false,
            meshes: None,
            cut_planes: Vec::new(),
        })
    }

    #[must_use]
    pub fn model(&self) -> &GeometryModel {
        &self.model
    }

    /// Shared handle to the model for readers outside the session.
    #[must_use]
    pub fn shared_model(&self) -> Arc<GeometryModel> {
        Arc::clone(&self.model)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.pool.threads()
    }

    /// Whether the next request estimates its region automatically.
    #[must_use]
    pub fn auto_region_enabled(&self) -> bool {
        self.config.region.auto && !self.auto_disabled
    }

    /// Meshes of the last successful construction.
    #[must_use]
    pub fn last_meshes(&self) -> Option<&MeshSet> {
        self.meshes.as_ref()
    }

    pub fn set_cut_planes(&mut self, planes: Vec<CutPlane>) {
        self.cut_planes = planes;
    }

    /// Replaces the configuration.
    ///
    /// The worker pool is rebuilt when the thread count changes and the
    /// cached region when the estimation budget changes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error and keeps the old configuration if
    /// `config` is invalid.
    pub fn set_config(&mut self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        if config.effective_threads() != self.pool.threads() {
            self.pool = WorkerPool::new(config.effective_threads())?;
        }
        if config.region.timeout_ms != self.config.region.timeout_ms {
            self.bounds = None;
        }
        self.config = config;
        Ok(())
    }

    /// Swaps in a freshly loaded model, dropping every derived cache and
    /// re-enabling automatic region estimation.
    pub fn reload(&mut self, model: GeometryModel) {
        self.model = Arc::new(model);
        self.bounds = None;
        self.meshes = None;
        self.auto_disabled = false;
        info!(cells = self.model.cell_count(), "model reloaded");
    }

    /// The region the next request will use.
    ///
    /// With automatic estimation enabled, a failed estimation is reported
    /// here as `Failed`; later requests fall back to the manual region.
    pub fn drawing_volume(
        &mut self,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Outcome<DrawingVolume> {
        let result = self.estimated_or_manual(cancel, progress);
        cancel.finish(result, || EstimationError::Cancelled.into()).into()
    }

    /// Traces a section through the current region.
    pub fn render_section(
        &mut self,
        plane: SectionPlane,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Outcome<RenderedImage> {
        let result = self.trace(plane, cancel, progress);
        cancel.finish(result, || OperationError::RenderCancelled.into()).into()
    }

    fn trace(
        &mut self,
        plane: SectionPlane,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Result<RenderedImage> {
        let volume = self.region(cancel, progress)?;
        let resolution = self.config.section.resolution()?;
        let request = SectionRequest::new(plane, volume, resolution)
            .with_oversampling(self.config.section.oversampling)
            .with_overlap_detection(self.config.section.detect_overlaps);
        section::render_section(&self.model, &self.pool, &request, cancel, progress)
    }

    /// Builds meshes for every visible cell, reusing the previous set
    /// when nothing that affects it changed.
    pub fn construct_meshes(
        &mut self,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Outcome<MeshSet> {
        let result = self.construct(cancel, progress);
        cancel.finish(result, || OperationError::ConstructionCancelled.into()).into()
    }

    fn construct(&mut self, cancel: &CancelToken, progress: &dyn ProgressSink) -> Result<MeshSet> {
        let region = self.region(cancel, progress)?;
        let mut settings = self.config.mesh_settings();
        settings.cut_planes.clone_from(&self.cut_planes);
        let constructor = PolyConstructor::new(&self.model, &self.pool, &settings, region);
        let set = match &self.meshes {
            Some(previous) => constructor.reuse(previous).execute(cancel, progress)?,
            None => constructor.execute(cancel, progress)?,
        };
        self.meshes = Some(set.clone());
        Ok(set)
    }

    /// Colors `image` with the configured palette, outlining cells when
    /// boundary drawing is on.
    pub fn paint_image(
        &mut self,
        image: &RenderedImage,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Outcome<ColorImage> {
        let palette = MaterialPalette::for_model(&self.model, &self.config.colors);
        let painter = PolyPainter::new(&self.model, &self.pool);
        let result = if self.config.section.draw_boundaries {
            painter.paint_image(&image.outlined(), &palette, cancel, progress)
        } else {
            painter.paint_image(image, &palette, cancel, progress)
        };
        cancel.finish(result, || OperationError::PaintCancelled.into()).into()
    }

    /// Colors the faces of `meshes` with the configured palette.
    pub fn paint_meshes(
        &mut self,
        meshes: &MeshSet,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Outcome<Vec<ColoredMesh>> {
        let palette = MaterialPalette::for_model(&self.model, &self.config.colors);
        let result = PolyPainter::new(&self.model, &self.pool)
            .paint_meshes(meshes, &palette, cancel, progress);
        cancel.finish(result, || OperationError::PaintCancelled.into()).into()
    }

    /// Writes `meshes` to `dir` in the format named by `format`.
    pub fn export(
        &mut self,
        meshes: &MeshSet,
        format: &str,
        dir: &Path,
        unify: bool,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Outcome<Vec<PathBuf>> {
        let result = format
            .parse::<Format3D>()
            .map_err(CelltraceError::from)
            .and_then(|format| {
                Cell3DExporter::new(format, dir)
                    .unified(unify)
                    .export(&self.model, meshes, cancel, progress)
            });
        cancel.finish(result, || ExportError::Cancelled.into()).into()
    }

    /// Region for a tracing or meshing request: the estimate, or the manual
    /// region once estimation has failed.
    fn region(
        &mut self,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Result<DrawingVolume> {
        match self.estimated_or_manual(cancel, progress) {
            Err(CelltraceError::Estimation(EstimationError::Failed { .. })) => {
                self.config.region.manual.volume()
            }
            other => other,
        }
    }

    fn estimated_or_manual(
        &mut self,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Result<DrawingVolume> {
        if !self.auto_region_enabled() {
            return self.config.region.manual.volume();
        }
        if let Some(report) = &self.bounds {
            return Ok(*report.volume());
        }
        let estimate =
            BoundingBoxCalculator::new(&self.model, &self.pool, self.config.region.timeout())
                .execute(cancel, progress);
        match estimate {
            Ok(report) => {
                let volume = *report.volume();
                self.bounds = Some(report);
                Ok(volume)
            }
            Err(CelltraceError::Estimation(EstimationError::Failed { cells })) => {
                warn!(%cells, "automatic region disabled until reload, using the manual region");
                self.auto_disabled = true;
                self.invalidate_derived();
                Err(EstimationError::Failed { cells }.into())
            }
            Err(e) => Err(e),
        }
    }

    fn invalidate_derived(&mut self) {
        Arc::make_mut(&mut self.model).invalidate_bounds();
        self.bounds = None;
        self.meshes = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geometry::{Cell, CellExpr, Cylinder, Plane, Sphere};
    use crate::math::{Point3, Vector3};
    use crate::progress::testing::RecordingProgress;
    use crate::progress::{NoProgress, RequestState, Stage};
    use crate::section::Pixel;

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("celltrace=debug")
            .try_init();
    }

    fn manual_config(threads: usize) -> EngineConfig {
        let mut c = EngineConfig::default();
        c.threads = threads;
        c.region.auto = false;
        c.region.manual.min = [-1.0; 3];
        c.region.manual.max = [1.0; 3];
        c.section.width = 4;
        c.section.height = 4;
        c.mesh.points_per_cell = 400;
        c
    }

    fn halves() -> GeometryModel {
        let mut m = GeometryModel::new();
        let px = m.add_surface("px", Plane::px(0.0).unwrap()).unwrap();
        m.add_cell(Cell::new("left", "water", CellExpr::negative(px))).unwrap();
        m.add_cell(Cell::new("right", "iron", CellExpr::positive(px))).unwrap();
        m
    }

    fn ball() -> GeometryModel {
        let mut m = GeometryModel::new();
        let s = m.add_surface("s", Sphere::new(Point3::origin(), 0.5).unwrap()).unwrap();
        m.add_cell(Cell::new("ball", "lead", CellExpr::negative(s))).unwrap();
        m
    }

    /// A rod along the x axis starting at x = 0, open towards +x.
    fn rod() -> GeometryModel {
        let mut m = GeometryModel::new();
        let c = m
            .add_surface("c", Cylinder::new(Point3::origin(), 0.5, Vector3::x()).unwrap())
            .unwrap();
        let px = m.add_surface("px", Plane::px(0.0).unwrap()).unwrap();
        m.add_cell(Cell::new(
            "rod",
            "fe",
            CellExpr::Intersection(vec![CellExpr::negative(c), CellExpr::positive(px)]),
        ))
        .unwrap();
        m
    }

    #[test]
    fn half_space_section_is_thread_independent() {
        init_logging();
        let mut images = Vec::new();
        for threads in [1, 4] {
            let mut session = Session::new(halves(), manual_config(threads)).unwrap();
            let cancel = CancelToken::new();
            let image = session
                .render_section(SectionPlane::xy(0.0), &cancel, &NoProgress)
                .success()
                .unwrap();
            assert_eq!(cancel.state(), RequestState::Completed);
            images.push(image);
        }
        let left = images[0].count(Pixel::Cell(halves().cell_ids()[0]));
        assert_eq!(left, 8);
        assert_eq!(images[0].count(Pixel::Background), 0);
        assert_eq!(images[0], images[1]);
    }

    #[test]
    fn unbounded_cell_falls_back_to_manual_region() {
        init_logging();
        let mut config = manual_config(2);
        config.region.auto = true;
        let mut session = Session::new(rod(), config).unwrap();
        assert!(session.auto_region_enabled());

        let outcome = session.drawing_volume(&CancelToken::new(), &NoProgress);
        match outcome {
            Outcome::Failed(e) => {
                let msg = e.to_string();
                assert!(msg.contains("infinite or too complex"), "{msg}");
                assert!(msg.contains("rod"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!session.auto_region_enabled());

        let volume = session
            .drawing_volume(&CancelToken::new(), &NoProgress)
            .success()
            .unwrap();
        assert_eq!(volume.max(), &Point3::new(1.0, 1.0, 1.0));
        let image = session.render_section(SectionPlane::yz(0.5), &CancelToken::new(), &NoProgress);
        assert!(image.is_success());

        session.reload(rod());
        assert!(session.auto_region_enabled());
    }

    #[test]
    fn render_falls_back_when_estimation_fails() {
        let mut config = manual_config(1);
        config.region.auto = true;
        let mut session = Session::new(rod(), config).unwrap();
        let image = session
            .render_section(SectionPlane::yz(0.5), &CancelToken::new(), &NoProgress)
            .success()
            .unwrap();
        assert!(image.count(Pixel::Background) > 0);
        assert!(!session.auto_region_enabled());
    }

    #[test]
    fn auto_region_is_estimated_once() {
        let mut config = manual_config(2);
        config.region.auto = true;
        let mut session = Session::new(ball(), config).unwrap();
        let progress = RecordingProgress::default();
        let first = session.drawing_volume(&CancelToken::new(), &progress).success().unwrap();
        let second = session.drawing_volume(&CancelToken::new(), &progress).success().unwrap();
        assert_eq!(first, second);
        assert!((first.max().x - 0.5).abs() < 1e-12);
        let stages = progress.stages.lock().unwrap();
        assert_eq!(stages.iter().filter(|(s, _)| *s == Stage::BoundingBoxes).count(), 1);
    }

    #[test]
    fn cancelled_requests_yield_nothing() {
        let mut session = Session::new(ball(), manual_config(2)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = session.render_section(SectionPlane::xy(0.0), &cancel, &NoProgress);
        assert!(outcome.is_cancelled());
        assert_eq!(cancel.state(), RequestState::Cancelled);

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(session.construct_meshes(&cancel, &NoProgress).is_cancelled());
        assert!(session.last_meshes().is_none());
    }

    #[test]
    fn mesh_paint_export_flow() {
        init_logging();
        let mut session = Session::new(ball(), manual_config(2)).unwrap();
        let meshes = session
            .construct_meshes(&CancelToken::new(), &NoProgress)
            .success()
            .unwrap();
        assert_eq!(meshes.meshes().len(), 1);
        assert_eq!(session.last_meshes(), Some(&meshes));

        let painted = session
            .paint_meshes(&meshes, &CancelToken::new(), &NoProgress)
            .success()
            .unwrap();
        assert_eq!(painted[0].face_colors.len(), meshes.meshes()[0].faces.len());

        let dir = tempfile::tempdir().unwrap();
        let files = session
            .export(&meshes, "ply", dir.path(), true, &CancelToken::new(), &NoProgress)
            .success()
            .unwrap();
        assert!(files[0].ends_with("unified.ply"));

        let bad =
            session.export(&meshes, "obj", dir.path(), false, &CancelToken::new(), &NoProgress);
        assert!(matches!(
            bad,
            Outcome::Failed(CelltraceError::Export(ExportError::UnsupportedFormat(_)))
        ));
    }

    #[test]
    fn painted_image_has_outlines() {
        let mut session = Session::new(halves(), manual_config(2)).unwrap();
        let image = session
            .render_section(SectionPlane::xy(0.0), &CancelToken::new(), &NoProgress)
            .success()
            .unwrap();
        let painted = session
            .paint_image(&image, &CancelToken::new(), &NoProgress)
            .success()
            .unwrap();
        assert!(painted.pixels().contains(&crate::color::BOUNDARY_COLOR));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut session = Session::new(ball(), manual_config(1)).unwrap();
        let mut bad = manual_config(1);
        bad.region.manual.min = [2.0; 3];
        assert!(session.set_config(bad).is_err());
        assert_eq!(session.config(), &manual_config(1));

        let mut more = manual_config(3);
        more.section.width = 6;
        session.set_config(more).unwrap();
        assert_eq!(session.threads(), 3);
    }
}
