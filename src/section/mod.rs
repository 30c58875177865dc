mod image;
mod merge;
mod trace;

pub use image::{Pixel, RenderedImage};
pub use merge::{overlay, PixelMergingWorker};
pub use trace::{trace_ray, ImageFrame, TrackSegment, TracingWorker};

use tracing::info;

use crate::bounds::DrawingVolume;
use crate::error::{RegionError, Result};
use crate::geometry::GeometryModel;
use crate::math::{unit, Point3, Vector3};
use crate::pool::WorkerPool;
use crate::progress::{CancelToken, ProgressSink, Stage};

/// Orthogonality tolerance for user-supplied basis vectors.
const BASIS_TOLERANCE: f64 = 1e-9;

/// A slicing plane with an orthonormal image basis.
///
/// Image columns run along `horizontal`, image rows run against `vertical`
/// (row 0 is the top of the image).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionPlane {
    origin: Point3,
    horizontal: Vector3,
    vertical: Vector3,
    normal: Vector3,
}

impl SectionPlane {
    /// Creates a plane from explicit horizontal and vertical directions.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::InvalidPlane`] if a direction is zero-length or
    /// the directions are not orthogonal.
    pub fn new(
        origin: Point3,
        horizontal: Vector3,
        vertical: Vector3,
    ) -> std::result::Result<Self, RegionError> {
        let h = unit(&horizontal)
            .ok_or_else(|| RegionError::InvalidPlane("zero-length horizontal vector".into()))?;
        let v = unit(&vertical)
            .ok_or_else(|| RegionError::InvalidPlane("zero-length vertical vector".into()))?;
        if h.dot(&v).abs() > BASIS_TOLERANCE {
            return Err(RegionError::InvalidPlane(
                "horizontal and vertical vectors are not orthogonal".into(),
            ));
        }
        Ok(Self {
            origin,
            horizontal: h,
            vertical: v,
            normal: h.cross(&v),
        })
    }

    /// Creates a plane from a normal, deriving the image basis.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::InvalidPlane`] for a zero-length normal.
    pub fn from_normal(origin: Point3, normal: Vector3) -> std::result::Result<Self, RegionError> {
        let n = unit(&normal)
            .ok_or_else(|| RegionError::InvalidPlane("zero-length normal".into()))?;
        let reference = if n.z.abs() < 0.9 { Vector3::z() } else { Vector3::y() };
        let h = reference.cross(&n).normalize();
        let v = n.cross(&h);
        Self::new(origin, h, v)
    }

    /// Plane `x = d` viewed with `y` to the right and `z` up.
    #[must_use]
    pub fn yz(d: f64) -> Self {
        Self::axis_aligned(Point3::new(d, 0.0, 0.0), Vector3::y(), Vector3::z())
    }

    /// Plane `y = d` viewed with `x` to the right and `z` up.
    #[must_use]
    pub fn xz(d: f64) -> Self {
        Self::axis_aligned(Point3::new(0.0, d, 0.0), Vector3::x(), Vector3::z())
    }

    /// Plane `z = d` viewed with `x` to the right and `y` up.
    #[must_use]
    pub fn xy(d: f64) -> Self {
        Self::axis_aligned(Point3::new(0.0, 0.0, d), Vector3::x(), Vector3::y())
    }

    fn axis_aligned(origin: Point3, horizontal: Vector3, vertical: Vector3) -> Self {
        Self {
            origin,
            horizontal,
            vertical,
            normal: horizontal.cross(&vertical),
        }
    }

    #[must_use]
    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    #[must_use]
    pub fn horizontal(&self) -> &Vector3 {
        &self.horizontal
    }

    #[must_use]
    pub fn vertical(&self) -> &Vector3 {
        &self.vertical
    }

    #[must_use]
    pub fn normal(&self) -> &Vector3 {
        &self.normal
    }

    /// The 3D point at in-plane coordinates `(h, v)`.
    #[must_use]
    pub fn point(&self, h: f64, v: f64) -> Point3 {
        self.origin + self.horizontal * h + self.vertical * v
    }
}

/// Image size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    width: usize,
    height: usize,
}

impl Resolution {
    /// # Errors
    ///
    /// Returns [`RegionError::NonPositiveResolution`] if either side is zero.
    pub fn new(width: usize, height: usize) -> std::result::Result<Self, RegionError> {
        if width == 0 || height == 0 {
            return Err(RegionError::NonPositiveResolution { width, height });
        }
        Ok(Self { width, height })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// Everything needed to trace one sectional image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionRequest {
    pub plane: SectionPlane,
    pub volume: DrawingVolume,
    pub resolution: Resolution,
    /// Samples per pixel along each image axis.
    pub oversampling: usize,
    /// Mark samples claimed by more than one cell as [`Pixel::Overlap`].
    pub detect_overlaps: bool,
}

impl SectionRequest {
    #[must_use]
    pub fn new(plane: SectionPlane, volume: DrawingVolume, resolution: Resolution) -> Self {
        Self {
            plane,
            volume,
            resolution,
            oversampling: 1,
            detect_overlaps: false,
        }
    }

    #[must_use]
    pub fn with_oversampling(mut self, oversampling: usize) -> Self {
        self.oversampling = oversampling.max(1);
        self
    }

    #[must_use]
    pub fn with_overlap_detection(mut self, detect: bool) -> Self {
        self.detect_overlaps = detect;
        self
    }
}

/// Traces `request` on `pool` and merges the rows into one image.
///
/// # Errors
///
/// Returns `RenderCancelled` if `cancel` fires before the image is complete,
/// and propagates worker failures.
pub fn render_section(
    model: &GeometryModel,
    pool: &WorkerPool,
    request: &SectionRequest,
    cancel: &CancelToken,
    progress: &dyn ProgressSink,
) -> Result<RenderedImage> {
    let worker = TracingWorker::new(model, request);
    let rows = request.resolution.height();
    let reports = pool.run(&worker, rows, cancel, progress, Stage::Tracing);

    let image = PixelMergingWorker::new(request.resolution).execute(reports, progress)?;
    info!(
        width = image.width(),
        height = image.height(),
        threads = pool.threads(),
        "section traced"
    );
    Ok(image)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{CelltraceError, OperationError};
    use crate::geometry::{Cell, CellExpr, Classification, Plane, Sphere};
    use crate::progress::NoProgress;

    fn halves() -> GeometryModel {
        let mut m = GeometryModel::new();
        let px = m.add_surface("px", Plane::px(0.0).unwrap()).unwrap();
        m.add_cell(Cell::new("left", "a", CellExpr::negative(px))).unwrap();
        m.add_cell(Cell::new("right", "b", CellExpr::positive(px))).unwrap();
        m
    }

    fn unit_cube() -> DrawingVolume {
        DrawingVolume::from_ranges([-1.0, 1.0, -1.0, 1.0, -1.0, 1.0]).unwrap()
    }

    fn section_request(plane: SectionPlane, width: usize, height: usize) -> SectionRequest {
        SectionRequest::new(plane, unit_cube(), Resolution::new(width, height).unwrap())
    }

    fn render(
        m: &GeometryModel,
        threads: usize,
        request: &SectionRequest,
    ) -> Result<RenderedImage> {
        let pool = WorkerPool::new(threads).unwrap();
        render_section(m, &pool, request, &CancelToken::new(), &NoProgress)
    }

    #[test]
    fn basis_validation() {
        let skewed = Vector3::new(1.0, 1.0, 0.0);
        assert!(SectionPlane::new(Point3::origin(), Vector3::x(), skewed).is_err());
        assert!(SectionPlane::new(Point3::origin(), Vector3::zeros(), Vector3::y()).is_err());
        let p = SectionPlane::from_normal(Point3::origin(), Vector3::new(0.0, 0.0, 2.0)).unwrap();
        assert!(p.horizontal().dot(p.vertical()).abs() < 1e-12);
        assert!((p.normal().z.abs() - 1.0).abs() < 1e-12);
        assert!(Resolution::new(0, 4).is_err());
    }

    #[test]
    fn half_space_scenario_is_split_evenly() {
        let m = halves();
        let request = section_request(SectionPlane::xy(0.0), 4, 4);
        let images: Vec<_> = [1, 4]
            .into_iter()
            .map(|threads| render(&m, threads, &request).unwrap())
            .collect();
        assert_eq!(images[0], images[1]);

        let left = m.cell_by_name("left").unwrap();
        let right = m.cell_by_name("right").unwrap();
        let image = &images[0];
        assert_eq!(image.count(Pixel::Cell(left)), 8);
        assert_eq!(image.count(Pixel::Cell(right)), 8);
        assert_eq!(image.count(Pixel::Background), 0);
        assert_eq!(image.get(0, 0), Some(Pixel::Cell(left)));
        assert_eq!(image.get(3, 3), Some(Pixel::Cell(right)));
    }

    #[test]
    fn output_is_identical_for_any_thread_count() {
        let mut m = GeometryModel::new();
        let s = m
            .add_surface("s", Sphere::new(Point3::new(0.2, -0.1, 0.0), 0.7).unwrap())
            .unwrap();
        m.add_cell(Cell::new("ball", "fe", CellExpr::negative(s))).unwrap();
        let request = section_request(SectionPlane::xy(0.1), 33, 17).with_oversampling(2);
        let reference = render(&m, 1, &request).unwrap();
        for threads in [2, 3, 7] {
            assert_eq!(render(&m, threads, &request).unwrap(), reference);
        }
    }

    #[test]
    fn every_pixel_is_classified() {
        let m = halves();
        let request = section_request(SectionPlane::xz(0.3), 9, 5);
        let image = render(&m, 2, &request).unwrap();
        assert_eq!(image.pixels().len(), 45);
        assert!(image
            .pixels()
            .iter()
            .all(|p| matches!(p, Pixel::Cell(_) | Pixel::Background)));
        // Cross-check against direct classification of the centers.
        let frame = ImageFrame::new(&request);
        for y in 0..5 {
            for x in 0..9 {
                let expected = match m.classify(&frame.pixel_center(x, y)) {
                    Classification::Cell(id) => Pixel::Cell(id),
                    Classification::Background => Pixel::Background,
                };
                assert_eq!(image.get(x, y), Some(expected));
            }
        }
    }

    #[test]
    fn cancelled_render_has_no_image() {
        let m = halves();
        let request = section_request(SectionPlane::xy(0.0), 64, 64);
        let token = CancelToken::new();
        token.cancel();
        let pool = WorkerPool::new(4).unwrap();
        let err = render_section(&m, &pool, &request, &token, &NoProgress).unwrap_err();
        assert!(matches!(err, CelltraceError::Operation(OperationError::RenderCancelled)));
    }
}
