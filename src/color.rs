use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geometry::{Cell, CellId, GeometryModel};

/// An opaque 8-bit RGB color, serialized as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Self = Self::new(0xff, 0xff, 0xff);
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const RED: Self = Self::new(0xff, 0, 0);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for anything but six hex digits.
    pub fn from_hex(s: &str) -> Result<Self, ConfigError> {
        let digits = s.strip_prefix('#').unwrap_or(s);
        let invalid = || ConfigError::Invalid(format!("not an #rrggbb color: {s:?}"));
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Channels scaled to `[0, 1]`.
    #[must_use]
    pub fn to_unit(self) -> [f32; 3] {
        [self.r, self.g, self.b].map(|c| f32::from(c) / 255.0)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Rgb {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

/// Color of background pixels.
pub const BACKGROUND_COLOR: Rgb = Rgb::WHITE;
/// Color of cell boundary lines.
pub const BOUNDARY_COLOR: Rgb = Rgb::BLACK;
/// Color of multiply-defined samples.
pub const OVERLAP_COLOR: Rgb = Rgb::RED;

const DEFAULT_COLORS: [Rgb; 22] = [
    Rgb::new(0xee, 0x99, 0xcc),
    Rgb::new(0x00, 0x00, 0xee),
    Rgb::new(0xcc, 0x99, 0xee),
    Rgb::new(0xee, 0x00, 0xee),
    Rgb::new(0xee, 0x80, 0x00),
    Rgb::new(0xee, 0xee, 0x99),
    Rgb::new(0x80, 0xee, 0x00),
    Rgb::new(0x99, 0xee, 0x99),
    Rgb::new(0x00, 0xee, 0x80),
    Rgb::new(0x99, 0xee, 0xee),
    Rgb::new(0x00, 0x80, 0xee),
    Rgb::new(0x99, 0x99, 0xee),
    Rgb::new(0x7f, 0x00, 0xee),
    Rgb::new(0xee, 0x99, 0xee),
    Rgb::new(0xee, 0x00, 0x7f),
    Rgb::new(0xee, 0xcc, 0x99),
    Rgb::new(0xee, 0xee, 0x00),
    Rgb::new(0xcc, 0xee, 0x99),
    Rgb::new(0x00, 0xee, 0x00),
    Rgb::new(0x99, 0xee, 0xcc),
    Rgb::new(0x00, 0xee, 0xee),
    Rgb::new(0x99, 0xcc, 0xee),
];

/// Returns the `i`-th default material color, cycling through the table.
#[must_use]
pub fn default_color(i: usize) -> Rgb {
    DEFAULT_COLORS[i % DEFAULT_COLORS.len()]
}

/// Maps cell attributes to a display color.
pub trait CellColorMap: Sync {
    fn color(&self, id: CellId, cell: &Cell) -> Rgb;
}

impl<F> CellColorMap for F
where
    F: Fn(CellId, &Cell) -> Rgb + Sync,
{
    fn color(&self, id: CellId, cell: &Cell) -> Rgb {
        self(id, cell)
    }
}

/// Material-keyed palette.
///
/// A cell's own color wins, then a configured material color, then the
/// default table in order of first appearance of the material.
#[derive(Debug, Clone, Default)]
pub struct MaterialPalette {
    materials: HashMap<String, Rgb>,
}

impl MaterialPalette {
    /// Builds the palette for every material used in `model`.
    #[must_use]
    pub fn for_model(model: &GeometryModel, overrides: &BTreeMap<String, Rgb>) -> Self {
        let mut materials = HashMap::new();
        let mut next = 0;
        for (_, cell) in model.cells() {
            if materials.contains_key(cell.material()) {
                continue;
            }
            let color = match overrides.get(cell.material()) {
                Some(c) => *c,
                None => {
                    next += 1;
                    default_color(next - 1)
                }
            };
            materials.insert(cell.material().to_owned(), color);
        }
        Self { materials }
    }

    #[must_use]
    pub fn material_color(&self, material: &str) -> Option<Rgb> {
        self.materials.get(material).copied()
    }
}

impl CellColorMap for MaterialPalette {
    fn color(&self, _id: CellId, cell: &Cell) -> Rgb {
        cell.color()
            .or_else(|| self.material_color(cell.material()))
            .unwrap_or(BACKGROUND_COLOR)
    }
}
