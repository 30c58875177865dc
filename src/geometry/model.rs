use std::collections::HashMap;

use slotmap::{SecondaryMap, SlotMap};

use crate::color::Rgb;
use crate::error::{GeometryError, Result};
use crate::math::Point3;

use super::cell::{Cell, CellExpr, CellId};
use super::surface::{Surface, SurfaceId, SurfaceKind};

/// Result of classifying a point against the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// The first cell (in insertion order) containing the point.
    Cell(CellId),
    /// No cell contains the point.
    Background,
}

impl Classification {
    #[must_use]
    pub fn cell(self) -> Option<CellId> {
        match self {
            Self::Cell(id) => Some(id),
            Self::Background => None,
        }
    }
}

/// A named surface entry.
#[derive(Debug, Clone)]
struct SurfaceEntry {
    name: String,
    surface: SurfaceKind,
}

/// CSG cell and surface database.
///
/// Cells are a flat set keyed by [`CellId`]; insertion order defines the
/// classification priority and the export index. The presentation hierarchy
/// is a separate child-to-parent table.
#[derive(Debug, Default, Clone)]
pub struct GeometryModel {
    surfaces: SlotMap<SurfaceId, SurfaceEntry>,
    cells: SlotMap<CellId, Cell>,
    order: Vec<CellId>,
    surface_names: HashMap<String, SurfaceId>,
    cell_names: HashMap<String, CellId>,
    parents: SecondaryMap<CellId, CellId>,
}

impl GeometryModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Surfaces ---

    /// Inserts a named surface and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::DuplicateName`] if the name is taken.
    pub fn add_surface(
        &mut self,
        name: impl Into<String>,
        surface: impl Into<SurfaceKind>,
    ) -> Result<SurfaceId> {
        let name = name.into();
        if self.surface_names.contains_key(&name) {
            return Err(GeometryError::DuplicateName(name).into());
        }
        let id = self.surfaces.insert(SurfaceEntry {
            name: name.clone(),
            surface: surface.into(),
        });
        self.surface_names.insert(name, id);
        Ok(id)
    }

    /// Returns the surface, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is not in the model.
    pub fn surface(&self, id: SurfaceId) -> Result<&SurfaceKind> {
        self.surfaces
            .get(id)
            .map(|e| &e.surface)
            .ok_or_else(|| GeometryError::EntityNotFound("surface".into()).into())
    }

    #[must_use]
    pub fn surface_by_name(&self, name: &str) -> Option<SurfaceId> {
        self.surface_names.get(name).copied()
    }

    #[must_use]
    pub fn surface_name(&self, id: SurfaceId) -> Option<&str> {
        self.surfaces.get(id).map(|e| e.name.as_str())
    }

    #[must_use]
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    // --- Cells ---

    /// Inserts a cell and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::DuplicateName`] if the name is taken and
    /// [`GeometryError::EntityNotFound`] if the expression references a
    /// surface or cell that is not in the model.
    pub fn add_cell(&mut self, cell: Cell) -> Result<CellId> {
        if self.cell_names.contains_key(cell.name()) {
            return Err(GeometryError::DuplicateName(cell.name().to_owned()).into());
        }
        let mut surfaces = Vec::new();
        let mut cells = Vec::new();
        cell.expr()
            .for_each_ref(&mut |s| surfaces.push(s), &mut |c| cells.push(c));
        let missing = if surfaces.iter().any(|&s| !self.surfaces.contains_key(s)) {
            Some("surface")
        } else if cells.iter().any(|&c| !self.cells.contains_key(c)) {
            Some("cell")
        } else {
            None
        };
        if let Some(kind) = missing {
            return Err(GeometryError::EntityNotFound(format!(
                "{kind} referenced by cell {}",
                cell.name()
            ))
            .into());
        }

        let name = cell.name().to_owned();
        let id = self.cells.insert(cell);
        self.order.push(id);
        self.cell_names.insert(name, id);
        Ok(id)
    }

    /// Returns the cell, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell is not in the model.
    pub fn cell(&self, id: CellId) -> Result<&Cell> {
        self.cells
            .get(id)
            .ok_or_else(|| GeometryError::EntityNotFound("cell".into()).into())
    }

    fn cell_mut(&mut self, id: CellId) -> Result<&mut Cell> {
        self.cells
            .get_mut(id)
            .ok_or_else(|| GeometryError::EntityNotFound("cell".into()).into())
    }

    #[must_use]
    pub fn cell_by_name(&self, name: &str) -> Option<CellId> {
        self.cell_names.get(name).copied()
    }

    /// Cell IDs in insertion order.
    #[must_use]
    pub fn cell_ids(&self) -> &[CellId] {
        &self.order
    }

    /// Iterates cells in insertion order.
    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.order
            .iter()
            .filter_map(|&id| self.cells.get(id).map(|c| (id, c)))
    }

    /// Visible cell IDs in insertion order.
    #[must_use]
    pub fn visible_cells(&self) -> Vec<CellId> {
        self.cells()
            .filter(|(_, c)| c.is_visible())
            .map(|(id, _)| id)
            .collect()
    }

    /// Position of the cell in insertion order.
    #[must_use]
    pub fn cell_index(&self, id: CellId) -> Option<usize> {
        self.order.iter().position(|&c| c == id)
    }

    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.order.len()
    }

    /// Shows or hides a cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell is not in the model.
    pub fn set_visible(&mut self, id: CellId, visible: bool) -> Result<()> {
        self.cell_mut(id)?.set_visible(visible);
        Ok(())
    }

    /// Sets or clears the explicit color of a cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell is not in the model.
    pub fn set_color(&mut self, id: CellId, color: Option<Rgb>) -> Result<()> {
        self.cell_mut(id)?.set_color(color);
        Ok(())
    }

    /// Drops every cached bounding box.
    pub fn invalidate_bounds(&mut self) {
        for cell in self.cells.values_mut() {
            cell.clear_bounds();
        }
    }

    // --- Hierarchy ---

    /// Records `parent` as the display parent of `child`.
    ///
    /// # Errors
    ///
    /// Returns an error if either cell is missing or the link would form a cycle.
    pub fn set_parent(&mut self, child: CellId, parent: CellId) -> Result<()> {
        self.cell(child)?;
        self.cell(parent)?;
        let mut cursor = Some(parent);
        while let Some(c) = cursor {
            if c == child {
                return Err(
                    GeometryError::Degenerate("cell hierarchy would form a cycle".into()).into(),
                );
            }
            cursor = self.parents.get(c).copied();
        }
        self.parents.insert(child, parent);
        Ok(())
    }

    #[must_use]
    pub fn parent(&self, id: CellId) -> Option<CellId> {
        self.parents.get(id).copied()
    }

    /// Children of `id` in insertion order.
    #[must_use]
    pub fn children(&self, id: CellId) -> Vec<CellId> {
        self.order
            .iter()
            .copied()
            .filter(|&c| self.parents.get(c) == Some(&id))
            .collect()
    }

    // --- Evaluation ---

    /// Implicit value of an expression: `<= 0` inside.
    #[must_use]
    pub fn expr_value(&self, expr: &CellExpr, p: &Point3) -> f64 {
        match expr {
            CellExpr::Halfspace { surface, sense } => self
                .surfaces
                .get(*surface)
                .map_or(f64::INFINITY, |e| sense.sign() * e.surface.value(p)),
            CellExpr::Intersection(items) => items
                .iter()
                .map(|e| self.expr_value(e, p))
                .fold(f64::NEG_INFINITY, f64::max),
            CellExpr::Union(items) => items
                .iter()
                .map(|e| self.expr_value(e, p))
                .fold(f64::INFINITY, f64::min),
            CellExpr::Complement(inner) => -self.expr_value(inner, p),
            CellExpr::Cell(id) => self.value(*id, p),
        }
    }

    /// Implicit value of a cell: `<= 0` inside. Unknown cells are never inside.
    #[must_use]
    pub fn value(&self, id: CellId, p: &Point3) -> f64 {
        self.cells
            .get(id)
            .map_or(f64::INFINITY, |c| self.expr_value(c.expr(), p))
    }

    #[must_use]
    pub fn contains(&self, id: CellId, p: &Point3) -> bool {
        self.value(id, p) <= 0.0
    }

    /// Classifies `p` as the first cell containing it, or background.
    #[must_use]
    pub fn classify(&self, p: &Point3) -> Classification {
        self.order
            .iter()
            .find(|&&id| self.contains(id, p))
            .map_or(Classification::Background, |&id| Classification::Cell(id))
    }

    /// Returns the first two cells containing `p` when it is multiply defined.
    #[must_use]
    pub fn overlap_at(&self, p: &Point3) -> Option<(CellId, CellId)> {
        let mut hits = self.order.iter().copied().filter(|&id| self.contains(id, p));
        let first = hits.next()?;
        hits.next().map(|second| (first, second))
    }
}
