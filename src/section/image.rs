use crate::geometry::{CellId, Classification};

use super::merge::overlay;

/// One raster sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pixel {
    Cell(CellId),
    Background,
    /// A cell boundary line drawn by [`RenderedImage::outlined`].
    Boundary,
    /// A sample claimed by more than one cell.
    Overlap,
}

impl From<Classification> for Pixel {
    fn from(c: Classification) -> Self {
        match c {
            Classification::Cell(id) => Self::Cell(id),
            Classification::Background => Self::Background,
        }
    }
}

/// A width x height raster of cell ids, stored row-major from the top row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    width: usize,
    height: usize,
    pixels: Vec<Pixel>,
}

impl RenderedImage {
    /// Wraps a row-major pixel buffer. Returns `None` on a size mismatch.
    #[must_use]
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<Pixel>) -> Option<Self> {
        (pixels.len() == width * height).then_some(Self {
            width,
            height,
            pixels,
        })
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
    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    /// Pixel at column `x`, row `y`.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<Pixel> {
        if x >= self.width {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    /// Iterates rows from the top.
    pub fn rows(&self) -> impl Iterator<Item = &[Pixel]> {
        self.pixels.chunks(self.width.max(1))
    }

    /// Number of pixels equal to `pixel`.
    #[must_use]
    pub fn count(&self, pixel: Pixel) -> usize {
        self.pixels.iter().filter(|&&p| p == pixel).count()
    }

    /// Returns a copy with [`Pixel::Boundary`] wherever a pixel differs from
    /// its right or lower neighbor.
    ///
    /// The horizontal and vertical scans are computed separately and merged
    /// with [`overlay`], boundaries taking priority.
    #[must_use]
    pub fn outlined(&self) -> Self {
        let (w, h) = (self.width, self.height);
        let mut horizontal = self.pixels.clone();
        let mut vertical = self.pixels.clone();
        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                if x + 1 < w && self.pixels[i] != self.pixels[i + 1] {
                    horizontal[i] = Pixel::Boundary;
                }
                if y + 1 < h && self.pixels[i] != self.pixels[i + w] {
                    vertical[i] = Pixel::Boundary;
                }
            }
        }
        Self {
            width: w,
            height: h,
            pixels: overlay(&horizontal, &vertical, &[Pixel::Boundary], Pixel::Boundary),
        }
    }
}
