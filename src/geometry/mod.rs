pub mod cell;
pub mod model;
pub mod surface;

pub use cell::{Cell, CellExpr, CellId, Sense};
pub use model::{Classification, GeometryModel};
pub use surface::{Cone, Cylinder, Plane, Sphere, Surface, SurfaceId, SurfaceKind, Torus};
