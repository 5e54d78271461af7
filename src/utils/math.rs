// src/utils/math.rs

/// Minimum-image convention: fold a coordinate difference into
/// `[-dim/2, dim/2]`.
#[inline]
pub fn nearest(dx: f64, dim: f64) -> f64 {
    if dx > dim / 2.0 {
        dx - dim
    } else if dx < -dim / 2.0 {
        dx + dim
    } else {
        dx
    }
}
