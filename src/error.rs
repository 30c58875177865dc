use thiserror::Error;

/// Top-level error type for the celltrace engine.
#[derive(Debug, Error)]
pub enum CelltraceError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Estimation(#[from] EstimationError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CelltraceError {
    /// Returns `true` for every user- or deadline-triggered cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Estimation(EstimationError::Cancelled)
                | Self::Operation(
                    OperationError::RenderCancelled
                        | OperationError::ConstructionCancelled
                        | OperationError::PaintCancelled
                )
                | Self::Export(ExportError::Cancelled)
        )
    }
}

/// Errors raised while building or querying the geometry model.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    #[error("zero-length vector")]
    ZeroVector,

    #[error("duplicate name: {0}")]
    DuplicateName(String),

    #[error("entity not found: {0}")]
    EntityNotFound(String),
}

/// Invalid drawing region, section plane or resolution.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("invalid region: max < min on axis {axis} ({min} > {max})")]
    Inverted { axis: char, min: f64, max: f64 },

    #[error("invalid region: non-finite bound on axis {axis}")]
    NonFinite { axis: char },

    #[error("invalid region: non-positive resolution {width}x{height}")]
    NonPositiveResolution { width: usize, height: usize },

    #[error("invalid region: {0}")]
    InvalidPlane(String),
}

/// Failures of the automatic drawing-volume estimation.
#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("bounding box estimation failed, infinite or too complex cells: {cells}")]
    Failed { cells: String },

    #[error("bounding box estimation cancelled")]
    Cancelled,
}

/// Failures of the parallel tracing, meshing and painting operations.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("render cancelled")]
    RenderCancelled,

    #[error("polygon construction cancelled")]
    ConstructionCancelled,

    #[error("polygon painting cancelled")]
    PaintCancelled,

    #[error(
        "not enough memory for cell {cell}: required {required_mb:.1} MB, \
         available per thread {available_mb:.1} MB"
    )]
    MemoryLimit {
        cell: String,
        required_mb: f64,
        available_mb: f64,
    },

    #[error("mesh exceeds 32-bit vertex indices: {vertices} vertices")]
    MeshTooLarge { vertices: usize },

    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),

    #[error("incomplete worker output: {0}")]
    IncompleteOutput(String),

    #[error("thread pool could not be built: {0}")]
    ThreadPool(String),
}

/// Errors raised while exporting meshes.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("export cancelled")]
    Cancelled,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("configuration file could not be read: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for results using [`CelltraceError`].
pub type Result<T> = std::result::Result<T, CelltraceError>;

/// Caller-facing result of a long-running request.
///
/// `Cancelled` and `Failed` never carry partial results.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Cancelled,
    Failed(CelltraceError),
}

impl<T> Outcome<T> {
    /// Converts back into a `Result`, mapping `Cancelled` to `cancelled`.
    ///
    /// # Errors
    ///
    /// Returns the failure, or `cancelled` for a cancelled request.
    pub fn into_result(self, cancelled: impl FnOnce() -> CelltraceError) -> Result<T> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Cancelled => Err(cancelled()),
            Self::Failed(err) => Err(err),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the value of a successful outcome.
    #[must_use]
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) if err.is_cancelled() => Self::Cancelled,
            Err(err) => Self::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_kinds_are_recognized() {
        let render: CelltraceError = OperationError::RenderCancelled.into();
        let estimate: CelltraceError = EstimationError::Cancelled.into();
        let export: CelltraceError = ExportError::Cancelled.into();
        assert!(render.is_cancelled());
        assert!(estimate.is_cancelled());
        assert!(export.is_cancelled());

        let failed: CelltraceError = ExportError::UnsupportedFormat("obj".into()).into();
        assert!(!failed.is_cancelled());
    }

    #[test]
    fn outcome_from_result() {
        let ok: Outcome<u32> = Ok(3).into();
        assert!(ok.is_success());

        let cancelled: Outcome<u32> =
            Err(CelltraceError::from(OperationError::ConstructionCancelled)).into();
        assert!(cancelled.is_cancelled());

        let failed: Outcome<u32> = Err(CelltraceError::from(RegionError::Inverted {
            axis: 'x',
            min: 1.0,
            max: 0.0,
        }))
        .into();
        assert!(matches!(
            failed,
            Outcome::Failed(CelltraceError::Region(RegionError::Inverted { .. }))
        ));
    }

    #[test]
    fn estimation_message_names_cells() {
        let err = EstimationError::Failed {
            cells: "outer".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("infinite or too complex"));
        assert!(msg.contains("outer"));
    }
}
