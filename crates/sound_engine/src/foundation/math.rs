//! Math utilities and types
//!
//! Provides the vector types used for listener and emitter positions.

pub use nalgebra::Vector3;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// Math utility functions
pub mod utils {
    use super::Vec3;

    /// Linear interpolation
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }

    /// Distance between two points
    pub fn distance(a: &Vec3, b: &Vec3) -> f32 {
        (a - b).norm()
    }

    /// Normalize a vector, falling back to `fallback` for zero-length input
    pub fn normalize_or(v: &Vec3, fallback: Vec3) -> Vec3 {
        let len = v.norm();
        if len > f32::EPSILON { v / len } else { fallback }
    }
}

#[cfg(test)]
mod tests {
    use super::utils::*;
    use super::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn test_lerp() {
        assert_relative_eq!(lerp(4.0, 8.0, 0.0), 4.0);
        assert_relative_eq!(lerp(0.0, 10.0, 0.25), 2.5);
    }

    #[test]
    fn test_normalize_or_zero_vector() {
        let up = Vec3::new(0.0, 1.0, 0.0);
        assert_eq!(normalize_or(&Vec3::zeros(), up), up);
        assert_relative_eq!(normalize_or(&Vec3::new(3.0, 0.0, 4.0), up).norm(), 1.0);
    }
}
