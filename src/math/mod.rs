/// 3D point type.
pub type Point3 = nalgebra::Point3<f64>;

/// 3D vector type.
pub type Vector3 = nalgebra::Vector3<f64>;

/// Global geometric tolerance for floating-point comparisons.
pub const TOLERANCE: f64 = 1e-10;

/// Returns the unit vector of `v`, or `None` when it is shorter than [`TOLERANCE`].
#[must_use]
pub fn unit(v: &Vector3) -> Option<Vector3> {
    let len = v.norm();
    if len < TOLERANCE {
        None
    } else {
        Some(v / len)
    }
}

/// Index (0, 1, 2) of the coordinate axis `v` is parallel to, if any.
#[must_use]
pub fn axis_index(v: &Vector3) -> Option<usize> {
    (0..3).find(|&i| (v[i].abs() - 1.0).abs() < 1e-12)
}
