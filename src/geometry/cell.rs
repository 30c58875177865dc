use std::sync::OnceLock;

use crate::bounds::Aabb;
use crate::color::Rgb;

use super::SurfaceId;

slotmap::new_key_type! {
    /// Unique identifier for a cell in the geometry model.
    pub struct CellId;
}

/// Side of a surface selected by a half-space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sense {
    /// Where the surface value is negative.
    Negative,
    /// Where the surface value is positive.
    Positive,
}

impl Sense {
    /// Returns the opposite side.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Negative => Self::Positive,
            Self::Positive => Self::Negative,
        }
    }

    /// Multiplier turning a surface value into an "inside is negative" value.
    #[must_use]
    pub fn sign(self) -> f64 {
        match self {
            Self::Negative => 1.0,
            Self::Positive => -1.0,
        }
    }
}

/// Boolean expression defining a cell's region.
///
/// An empty `Intersection` is all of space, an empty `Union` is nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum CellExpr {
    /// One side of a surface.
    Halfspace { surface: SurfaceId, sense: Sense },
    /// Points inside every operand.
    Intersection(Vec<CellExpr>),
    /// Points inside at least one operand.
    Union(Vec<CellExpr>),
    /// Points outside the operand.
    Complement(Box<CellExpr>),
    /// The region of another cell.
    Cell(CellId),
}

impl CellExpr {
    #[must_use]
    pub fn halfspace(surface: SurfaceId, sense: Sense) -> Self {
        Self::Halfspace { surface, sense }
    }

    #[must_use]
    pub fn negative(surface: SurfaceId) -> Self {
        Self::halfspace(surface, Sense::Negative)
    }

    #[must_use]
    pub fn positive(surface: SurfaceId) -> Self {
        Self::halfspace(surface, Sense::Positive)
    }

    #[must_use]
    pub fn complement(expr: CellExpr) -> Self {
        Self::Complement(Box::new(expr))
    }

    /// Visits every surface and cell reference in the expression.
    pub(crate) fn for_each_ref(
        &self,
        on_surface: &mut impl FnMut(SurfaceId),
        on_cell: &mut impl FnMut(CellId),
    ) {
        match self {
            Self::Halfspace { surface, .. } => on_surface(*surface),
            Self::Intersection(items) | Self::Union(items) => {
                for item in items {
                    item.for_each_ref(on_surface, on_cell);
                }
            }
            Self::Complement(inner) => inner.for_each_ref(on_surface, on_cell),
            Self::Cell(id) => on_cell(*id),
        }
    }
}

/// A CSG cell: a named region with display attributes.
///
/// The bounding box cache is filled lazily by the bounding-box estimation and
/// cleared whenever the owning model changes.
#[derive(Debug)]
pub struct Cell {
    name: String,
    material: String,
    expr: CellExpr,
    visible: bool,
    color: Option<Rgb>,
    bounds: OnceLock<Aabb>,
}

impl Cell {
    /// Creates a visible cell with no explicit color.
    #[must_use]
    pub fn new(name: impl Into<String>, material: impl Into<String>, expr: CellExpr) -> Self {
        Self {
            name: name.into(),
            material: material.into(),
            expr,
            visible: true,
            color: None,
            bounds: OnceLock::new(),
        }
    }

    /// Sets the explicit color reference.
    #[must_use]
    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }

    /// Sets the visibility flag.
    #[must_use]
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn material(&self) -> &str {
        &self.material
    }

    #[must_use]
    pub fn expr(&self) -> &CellExpr {
        &self.expr
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    #[must_use]
    pub fn color(&self) -> Option<Rgb> {
        self.color
    }

    /// Returns the cached bounding box, if one has been estimated.
    #[must_use]
    pub fn cached_bounds(&self) -> Option<&Aabb> {
        self.bounds.get()
    }

    pub(crate) fn cache_bounds(&self, bounds: Aabb) {
        // A concurrent estimate of the same cell yields the same box.
        let _ = self.bounds.set(bounds);
    }

    pub(crate) fn clear_bounds(&mut self) {
        self.bounds = OnceLock::new();
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub(crate) fn set_color(&mut self, color: Option<Rgb>) {
        self.color = color;
    }
}

impl Clone for Cell {
    fn clone(&self) -> Self {
        let bounds = OnceLock::new();
        if let Some(b) = self.bounds.get() {
            let _ = bounds.set(*b);
        }
        Self {
            name: self.name.clone(),
            material: self.material.clone(),
            expr: self.expr.clone(),
            visible: self.visible,
            color: self.color,
            bounds,
        }
    }
}
