// Re-export glam for convenience
pub use glam::*;

// usdi math types
pub mod convert;
mod transform;
pub use transform::Transform;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_creation() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(v.x, 1.0);
        assert_eq!(v.y, 2.0);
        assert_eq!(v.z, 3.0);
    }

    #[test]
    fn test_mat4_identity_transform() {
        let m = Mat4::IDENTITY;
        let p = Vec3::new(4.0, 5.0, 6.0);
        assert_eq!(m.transform_point3(p), p);
    }
}
