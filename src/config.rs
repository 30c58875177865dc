//! Engine configuration.
//!
//! Every section has defaults, so a JSON document only needs the keys it
//! changes:
//!
//! ```json
//! { "threads": 4, "region": { "auto": false }, "colors": { "water": "#0000ff" } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bounds::DrawingVolume;
use crate::color::Rgb;
use crate::error::{ConfigError, Result};
use crate::math::Point3;
use crate::section::Resolution;
use crate::tessellation::MeshSettings;

/// Drawing-region selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Estimate the region from the geometry.
    pub auto: bool,
    /// Per-cell time budget of the estimation, in milliseconds.
    pub timeout_ms: u64,
    /// Region used when `auto` is off or estimation failed.
    pub manual: ManualRegion,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            auto: true,
            timeout_ms: 2000,
            manual: ManualRegion::default(),
        }
    }
}

impl RegionConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Explicit region corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualRegion {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for ManualRegion {
    fn default() -> Self {
        Self {
            min: [-100.0; 3],
            max: [100.0; 3],
        }
    }
}

impl ManualRegion {
    /// # Errors
    ///
    /// Returns `InvalidRegion` when a bound is not finite or `max < min`.
    pub fn volume(&self) -> Result<DrawingVolume> {
        Ok(DrawingVolume::new(Point3::from(self.min), Point3::from(self.max))?)
    }
}

/// Section image settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionConfig {
    pub width: usize,
    pub height: usize,
    /// Samples per pixel along each image axis.
    pub oversampling: usize,
    pub draw_boundaries: bool,
    pub detect_overlaps: bool,
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            oversampling: 1,
            draw_boundaries: true,
            detect_overlaps: false,
        }
    }
}

impl SectionConfig {
    /// # Errors
    ///
    /// Returns `InvalidRegion` for a zero width or height.
    pub fn resolution(&self) -> Result<Resolution> {
        Ok(Resolution::new(self.width, self.height)?)
    }
}

/// Polygon construction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub points_per_cell: usize,
    pub smoothing_factor: f64,
    pub memory_limit_percent: f64,
    pub memory_budget_mb: f64,
    pub tolerance: f64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        let d = MeshSettings::default();
        Self {
            points_per_cell: d.points_per_cell,
            smoothing_factor: d.smoothing_factor,
            memory_limit_percent: d.memory_limit_percent,
            memory_budget_mb: d.memory_budget_mb,
            tolerance: d.tolerance,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads; `0` uses the available hardware concurrency.
    pub threads: usize,
    pub region: RegionConfig,
    pub section: SectionConfig,
    pub mesh: MeshConfig,
    /// Material tag to display color.
    pub colors: BTreeMap<String, Rgb>,
}

impl EngineConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`EngineConfig::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(ConfigError::from)?;
        Self::from_json_str(&json)
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self).map_err(ConfigError::from)?)
    }

    /// Checks every value range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let invalid =
            |msg: &str| -> Result<()> { Err(ConfigError::Invalid(msg.to_owned()).into()) };

        if self.region.timeout_ms == 0 {
            return invalid("region.timeout_ms must be > 0");
        }
        if let Err(e) = self.region.manual.volume() {
            return Err(ConfigError::Invalid(format!("region.manual: {e}")).into());
        }
        if self.section.width == 0 || self.section.height == 0 {
            return invalid("section.width and section.height must be > 0");
        }
        if self.section.oversampling == 0 {
            return invalid("section.oversampling must be >= 1");
        }
        let mesh = &self.mesh;
        if mesh.points_per_cell == 0 {
            return invalid("mesh.points_per_cell must be > 0");
        }
        if !(mesh.smoothing_factor.is_finite() && mesh.smoothing_factor >= 0.0) {
            return invalid("mesh.smoothing_factor must be finite and >= 0");
        }
        if !(mesh.memory_limit_percent > 0.0 && mesh.memory_limit_percent <= 100.0) {
            return invalid("mesh.memory_limit_percent must be in (0, 100]");
        }
        if !(mesh.memory_budget_mb.is_finite() && mesh.memory_budget_mb > 0.0) {
            return invalid("mesh.memory_budget_mb must be finite and > 0");
        }
        if !(mesh.tolerance.is_finite() && mesh.tolerance > 0.0) {
            return invalid("mesh.tolerance must be finite and > 0");
        }
        Ok(())
    }

    /// Thread count with `0` resolved to the hardware concurrency.
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            self.threads
        }
    }

    /// Mesh settings without cut planes.
    #[must_use]
    pub fn mesh_settings(&self) -> MeshSettings {
        MeshSettings {
            points_per_cell: self.mesh.points_per_cell,
            smoothing_factor: self.mesh.smoothing_factor,
            memory_limit_percent: self.mesh.memory_limit_percent,
            memory_budget_mb: self.mesh.memory_budget_mb,
            tolerance: self.mesh.tolerance,
            cut_planes: Vec::new(),
        }
    }
}
