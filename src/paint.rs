//! Recoloring of traced images and constructed meshes.
//!
//! Painting never touches geometry: it maps the cell ids already stored in
//! an image or mesh through a [`CellColorMap`].

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::debug;

use crate::color::{CellColorMap, Rgb, BACKGROUND_COLOR, BOUNDARY_COLOR, OVERLAP_COLOR};
use crate::error::{OperationError, Result};
use crate::geometry::{CellId, GeometryModel};
use crate::pool::WorkerPool;
use crate::progress::{CancelToken, ProgressSink, Stage};
use crate::section::{Pixel, RenderedImage};
use crate::tessellation::MeshSet;

/// A color raster matching a [`RenderedImage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorImage {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl ColorImage {
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<Rgb> {
        (x < self.width && y < self.height).then(|| self.pixels[y * self.width + x])
    }

    /// Packed 8-bit RGB triplets, row-major.
    #[must_use]
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|c| [c.r, c.g, c.b]).collect()
    }
}

/// Face colors of one mesh of a [`MeshSet`], in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColoredMesh {
    pub cell: Option<CellId>,
    pub face_colors: Vec<Rgb>,
}

/// Applies a color mapping to images and meshes.
pub struct PolyPainter<'a> {
    model: &'a GeometryModel,
    pool: &'a WorkerPool,
}

impl<'a> PolyPainter<'a> {
    #[must_use]
    pub fn new(model: &'a GeometryModel, pool: &'a WorkerPool) -> Self {
        Self { model, pool }
    }

    fn lookup(&self, colors: &dyn CellColorMap) -> HashMap<CellId, Rgb> {
        self.model
            .cells()
            .map(|(id, cell)| (id, colors.color(id, cell)))
            .collect()
    }

    /// Colors every pixel of `image`.
    ///
    /// # Errors
    ///
    /// Returns `PaintCancelled` if `cancel` fires before every row is painted.
    pub fn paint_image(
        &self,
        image: &RenderedImage,
        colors: &dyn CellColorMap,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Result<ColorImage> {
        progress.begin(Stage::Painting, image.height());
        let table = self.lookup(colors);
        let color = |p: &Pixel| match p {
            Pixel::Cell(id) => table.get(id).copied().unwrap_or(BACKGROUND_COLOR),
            Pixel::Background => BACKGROUND_COLOR,
            Pixel::Boundary => BOUNDARY_COLOR,
            Pixel::Overlap => OVERLAP_COLOR,
        };
        let rows: Vec<Vec<Rgb>> = self.pool.install(|| {
            image
                .pixels()
                .par_chunks(image.width().max(1))
                .map(|row| -> Result<Vec<Rgb>> {
                    if cancel.is_cancelled() {
                        return Err(OperationError::PaintCancelled.into());
                    }
                    Ok(row.iter().map(color).collect())
                })
                .collect::<Result<_>>()
        })?;
        progress.advance(image.height(), image.height());
        debug!(width = image.width(), height = image.height(), "image painted");
        Ok(ColorImage {
            width: image.width(),
            height: image.height(),
            pixels: rows.concat(),
        })
    }

    /// Colors every face of every mesh in `meshes` by its cell tag.
    ///
    /// # Errors
    ///
    /// Returns `PaintCancelled` if `cancel` fires before every mesh is painted.
    pub fn paint_meshes(
        &self,
        meshes: &MeshSet,
        colors: &dyn CellColorMap,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<ColoredMesh>> {
        progress.begin(Stage::Painting, meshes.meshes().len());
        let table = self.lookup(colors);
        let painted: Vec<ColoredMesh> = self.pool.install(|| {
            meshes
                .meshes()
                .par_iter()
                .map(|mesh| -> Result<ColoredMesh> {
                    if cancel.is_cancelled() {
                        return Err(OperationError::PaintCancelled.into());
                    }
                    let face_colors = mesh
                        .face_cells
                        .iter()
                        .map(|id| table.get(id).copied().unwrap_or(BACKGROUND_COLOR))
                        .collect();
                    Ok(ColoredMesh {
                        cell: mesh.cell,
                        face_colors,
                    })
                })
                .collect::<Result<_>>()
        })?;
        progress.advance(painted.len(), painted.len());
        debug!(meshes = painted.len(), "meshes painted");
        Ok(painted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::bounds::DrawingVolume;
    use crate::color::MaterialPalette;
    use crate::geometry::{Cell, CellExpr, Plane};
    use crate::progress::NoProgress;
    use crate::section::{render_section, Resolution, SectionPlane, SectionRequest};
    use crate::tessellation::{MeshSettings, PolyConstructor};

    fn halves() -> GeometryModel {
        let mut m = GeometryModel::new();
        let px = m.add_surface("px", Plane::px(0.0).unwrap()).unwrap();
        m.add_cell(Cell::new("left", "water", CellExpr::negative(px))).unwrap();
        m.add_cell(Cell::new("right", "iron", CellExpr::positive(px)).with_color(Rgb::new(1, 2, 3)))
            .unwrap();
        m
    }

    fn volume() -> DrawingVolume {
        DrawingVolume::from_ranges([-1.0, 1.0, -1.0, 1.0, -1.0, 1.0]).unwrap()
    }

    #[test]
    fn image_colors_follow_the_palette() {
        let m = halves();
        let pool = WorkerPool::new(2).unwrap();
        let request =
            SectionRequest::new(SectionPlane::xy(0.0), volume(), Resolution::new(4, 2).unwrap());
        let image = render_section(&m, &pool, &request, &CancelToken::new(), &NoProgress).unwrap();

        let palette = MaterialPalette::for_model(&m, &BTreeMap::new());
        let painted = PolyPainter::new(&m, &pool)
            .paint_image(&image, &palette, &CancelToken::new(), &NoProgress)
            .unwrap();
        assert_eq!(painted.get(0, 0), palette.material_color("water"));
        assert_eq!(painted.get(3, 1), Some(Rgb::new(1, 2, 3)));
        assert_eq!(painted.to_rgb_bytes().len(), 4 * 2 * 3);

        let outlined = PolyPainter::new(&m, &pool)
            .paint_image(&image.outlined(), &palette, &CancelToken::new(), &NoProgress)
            .unwrap();
        assert!(outlined.pixels().contains(&BOUNDARY_COLOR));
    }

    #[test]
    fn painting_ignores_thread_count() {
        let m = halves();
        let request =
            SectionRequest::new(SectionPlane::xy(0.0), volume(), Resolution::new(7, 5).unwrap());
        let single = WorkerPool::new(1).unwrap();
        let image =
            render_section(&m, &single, &request, &CancelToken::new(), &NoProgress).unwrap();
        let gray = |_: CellId, cell: &Cell| {
            if cell.name() == "left" {
                Rgb::new(50, 50, 50)
            } else {
                Rgb::new(200, 200, 200)
            }
        };
        let outputs: Vec<_> = [1, 3]
            .into_iter()
            .map(|threads| {
                let pool = WorkerPool::new(threads).unwrap();
                PolyPainter::new(&m, &pool)
                    .paint_image(&image, &gray, &CancelToken::new(), &NoProgress)
                    .unwrap()
            })
            .collect();
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn mesh_faces_get_their_cell_color() {
        let m = halves();
        let pool = WorkerPool::new(2).unwrap();
        let settings = MeshSettings {
            points_per_cell: 500,
            ..MeshSettings::default()
        };
        let meshes = PolyConstructor::new(&m, &pool, &settings, volume())
            .execute(&CancelToken::new(), &NoProgress)
            .unwrap();
        let red = |_: CellId, _: &Cell| Rgb::RED;
        let painted = PolyPainter::new(&m, &pool)
            .paint_meshes(&meshes, &red, &CancelToken::new(), &NoProgress)
            .unwrap();
        assert_eq!(painted.len(), 2);
        for (colored, mesh) in painted.iter().zip(meshes.meshes()) {
            assert_eq!(colored.cell, mesh.cell);
            assert_eq!(colored.face_colors.len(), mesh.faces.len());
            assert!(colored.face_colors.iter().all(|&c| c == Rgb::RED));
        }
    }

    #[test]
    fn cancelled_painting_returns_nothing() {
        let m = halves();
        let pool = WorkerPool::new(2).unwrap();
        let image = RenderedImage::from_pixels(2, 1, vec![Pixel::Background; 2]).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = PolyPainter::new(&m, &pool)
            .paint_image(&image, &|_: CellId, _: &Cell| Rgb::BLACK, &cancel, &NoProgress)
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
