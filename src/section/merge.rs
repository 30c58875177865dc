use tracing::debug;

use crate::error::{OperationError, Result};
use crate::pool::{self, WorkerReport};
use crate::progress::{ProgressSink, Stage};

use super::image::{Pixel, RenderedImage};
use super::Resolution;

/// Joins the row buffers of a tracing run into one image.
///
/// Waits for nothing itself: it is handed the reports after the pool's
/// barrier. A cancelled slot aborts the whole image.
#[derive(Debug, Clone, Copy)]
pub struct PixelMergingWorker {
    resolution: Resolution,
}

impl PixelMergingWorker {
    #[must_use]
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }

    /// Concatenates the slot buffers in row order. Each slot is one unit of
    /// [`Stage::Merging`] progress.
    ///
    /// # Errors
    ///
    /// Returns `RenderCancelled` if any slot was cancelled, the first slot
    /// failure otherwise.
    pub fn execute(
        &self,
        reports: Vec<WorkerReport<Pixel>>,
        progress: &dyn ProgressSink,
    ) -> Result<RenderedImage> {
        let slots = reports.len();
        progress.begin(Stage::Merging, slots);
        let pixels = pool::collect(reports, || OperationError::RenderCancelled.into())?;
        let (w, h) = (self.resolution.width(), self.resolution.height());
        debug!(slots, pixels = pixels.len(), "merging ray data");
        let image = RenderedImage::from_pixels(w, h, pixels).ok_or_else(|| {
            OperationError::IncompleteOutput(format!("row buffers do not fill a {w}x{h} image"))
        })?;
        progress.advance(slots, slots);
        Ok(image)
    }
}

/// Merges two equally sized arrays element-wise.
///
/// Equal elements are kept. Otherwise the first entry of `priority` found
/// in either array wins, and if neither element has priority the result is
/// `conflict`.
#[must_use]
pub fn overlay<T: PartialEq + Copy>(a: &[T], b: &[T], priority: &[T], conflict: T) -> Vec<T> {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            if x == y {
                return x;
            }
            priority
                .iter()
                .copied()
                .find(|p| *p == x || *p == y)
                .unwrap_or(conflict)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::CelltraceError;
    use crate::progress::testing::RecordingProgress;
    use crate::progress::NoProgress;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Mark {
        Undefined,
        Unbound,
        Bound,
        Double,
    }

    #[test]
    fn overlay_follows_priority_then_conflict() {
        use Mark::{Bound, Double, Unbound, Undefined};
        let a = [Undefined, Bound, Unbound, Undefined, Bound];
        let b = [Undefined, Unbound, Undefined, Bound, Bound];
        let merged = overlay(&a, &b, &[Unbound, Bound], Double);
        assert_eq!(merged, vec![Undefined, Unbound, Unbound, Bound, Bound]);

        let merged = overlay(&[Undefined], &[Double], &[Unbound], Double);
        assert_eq!(merged, vec![Double]);
    }

    #[test]
    fn rows_are_concatenated_in_order() {
        let res = Resolution::new(2, 2).unwrap();
        let reports = vec![
            WorkerReport::Completed {
                range: 0..1,
                items: vec![Pixel::Background, Pixel::Boundary],
            },
            WorkerReport::Completed {
                range: 1..2,
                items: vec![Pixel::Overlap, Pixel::Background],
            },
        ];
        let progress = RecordingProgress::default();
        let image = PixelMergingWorker::new(res).execute(reports, &progress).unwrap();
        assert_eq!(image.get(1, 0), Some(Pixel::Boundary));
        assert_eq!(*progress.stages.lock().unwrap(), vec![(Stage::Merging, 2)]);
        assert_eq!(*progress.max_done.lock().unwrap(), 2);
        assert_eq!(image.get(0, 1), Some(Pixel::Overlap));
    }

    #[test]
    fn any_cancelled_slot_discards_the_image() {
        let res = Resolution::new(1, 2).unwrap();
        let reports = vec![
            WorkerReport::Completed {
                range: 0..1,
                items: vec![Pixel::Background],
            },
            WorkerReport::Cancelled { range: 1..2 },
        ];
        let err = PixelMergingWorker::new(res)
            .execute(reports, &NoProgress)
            .unwrap_err();
        assert!(matches!(err, CelltraceError::Operation(OperationError::RenderCancelled)));
    }
}
