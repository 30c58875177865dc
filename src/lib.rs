//! Parallel section tracing and cell meshing for CSG geometry models.

pub mod bounds;
pub mod color;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod math;
pub mod paint;
pub mod pool;
pub mod progress;
pub mod section;
pub mod session;
pub mod tessellation;

pub use error::{CelltraceError, Outcome, Result};
pub use session::Session;
