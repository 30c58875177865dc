use crate::bounds::DrawingVolume;
use crate::error::Result;
use crate::geometry::{Classification, GeometryModel};
use crate::math::Point3;
use crate::pool::{Worker, WorkerContext};

use super::image::Pixel;
use super::{SectionPlane, SectionRequest};

/// Maximum bisection steps when locating a boundary along a ray.
const MAX_BISECTIONS: usize = 64;

/// Pixel geometry of a section request.
///
/// The image rectangle is the projection of the drawing volume onto the
/// plane's horizontal and vertical axes, measured from the plane origin.
#[derive(Debug, Clone, Copy)]
pub struct ImageFrame {
    plane: SectionPlane,
    volume: DrawingVolume,
    h_min: f64,
    v_max: f64,
    dh: f64,
    dv: f64,
    width: usize,
    height: usize,
}

impl ImageFrame {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(request: &SectionRequest) -> Self {
        let plane = request.plane;
        let (mut h_min, mut h_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut v_min, mut v_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for corner in request.volume.aabb().corners() {
            let d = corner - plane.origin();
            let (h, v) = (d.dot(plane.horizontal()), d.dot(plane.vertical()));
            h_min = h_min.min(h);
            h_max = h_max.max(h);
            v_min = v_min.min(v);
            v_max = v_max.max(v);
        }
        let (width, height) = (request.resolution.width(), request.resolution.height());
        Self {
            plane,
            volume: request.volume,
            h_min,
            v_max,
            dh: (h_max - h_min) / width as f64,
            dv: (v_max - v_min) / height as f64,
            width,
            height,
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Point at fractional pixel position `(x + fx, y + fy)`, `f` in `[0, 1)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sample_point(&self, x: usize, y: usize, fx: f64, fy: f64) -> Point3 {
        let h = self.h_min + (x as f64 + fx) * self.dh;
        let v = self.v_max - (y as f64 + fy) * self.dv;
        self.plane.point(h, v)
    }

    #[must_use]
    pub fn pixel_center(&self, x: usize, y: usize) -> Point3 {
        self.sample_point(x, y, 0.5, 0.5)
    }
}

/// Classifies every pixel of one image row per unit of work.
///
/// Rows are independent; each slot writes only its own buffer.
pub struct TracingWorker<'a> {
    model: &'a GeometryModel,
    frame: ImageFrame,
    oversampling: usize,
    detect_overlaps: bool,
}

impl<'a> TracingWorker<'a> {
    #[must_use]
    pub fn new(model: &'a GeometryModel, request: &SectionRequest) -> Self {
        Self {
            model,
            frame: ImageFrame::new(request),
            oversampling: request.oversampling.max(1),
            detect_overlaps: request.detect_overlaps,
        }
    }

    fn sample(&self, p: &Point3) -> Pixel {
        if !self.frame.volume.contains(p) {
            return Pixel::Background;
        }
        if self.detect_overlaps && self.model.overlap_at(p).is_some() {
            return Pixel::Overlap;
        }
        self.model.classify(p).into()
    }

    #[allow(clippy::cast_precision_loss)]
    fn pixel(&self, x: usize, y: usize) -> Pixel {
        let k = self.oversampling;
        if k == 1 {
            return self.sample(&self.frame.pixel_center(x, y));
        }
        // Majority vote; the earliest sample wins ties.
        let mut votes: Vec<(Pixel, usize)> = Vec::new();
        for sy in 0..k {
            for sx in 0..k {
                let fx = (sx as f64 + 0.5) / k as f64;
                let fy = (sy as f64 + 0.5) / k as f64;
                let p = self.sample(&self.frame.sample_point(x, y, fx, fy));
                match votes.iter_mut().find(|(v, _)| *v == p) {
                    Some((_, n)) => *n += 1,
                    None => votes.push((p, 1)),
                }
            }
        }
        let mut best = (Pixel::Background, 0);
        for (p, n) in votes {
            if n > best.1 {
                best = (p, n);
            }
        }
        best.0
    }
}

impl Worker for TracingWorker<'_> {
    type Output = Pixel;

    fn process(&self, row: usize, _ctx: &WorkerContext<'_>, out: &mut Vec<Pixel>) -> Result<()> {
        out.extend((0..self.frame.width).map(|x| self.pixel(x, row)));
        Ok(())
    }
}

/// A stretch of a ray inside one classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSegment {
    pub class: Classification,
    /// Distance from the ray start where the segment begins.
    pub start: f64,
    /// Distance from the ray start where the segment ends.
    pub end: f64,
}

impl TrackSegment {
    #[must_use]
    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// Splits the segment `from -> to` into runs of equal classification.
///
/// The ray is probed at `steps` equal intervals and every change is refined
/// by bisection. Features thinner than one step may be missed.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn trace_ray(
    model: &GeometryModel,
    from: Point3,
    to: Point3,
    steps: usize,
) -> Vec<TrackSegment> {
    let length = (to - from).norm();
    let steps = steps.max(1);
    let at = |t: f64| model.classify(&(from + (to - from) * (t / length.max(f64::MIN_POSITIVE))));
    let tolerance = length * 1e-12;

    let mut segments = Vec::new();
    let mut start = 0.0;
    let mut class = at(0.0);
    let mut prev_t = 0.0;
    for i in 1..=steps {
        let t = length * i as f64 / steps as f64;
        let next = at(t);
        if next != class {
            let (mut lo, mut hi) = (prev_t, t);
            for _ in 0..MAX_BISECTIONS {
                if hi - lo <= tolerance {
                    break;
                }
                let mid = 0.5 * (lo + hi);
                if at(mid) == class {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            segments.push(TrackSegment { class, start, end: hi });
            start = hi;
            class = next;
        }
        prev_t = t;
    }
    segments.push(TrackSegment {
        class,
        start,
        end: length,
    });
    segments
}
