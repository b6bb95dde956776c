//! Source-to-target coordinate-frame conversion.
//!
//! Authoring tools write scenes in a frame where X is right, Y is
//! forward, and Z is up. The consuming engine expects X forward,
//! Y right, Z up. The single mapping used everywhere is
//!
//! ```text
//! (x, y, z)_source -> (y, -x, z)_target
//! ```
//!
//! which sends source-Y onto target-X and has determinant +1, so
//! handedness (and therefore triangle winding) is preserved.
//!
//! Derived rules:
//! - positions, normals, and translations use the mapping directly
//! - scale vectors use `(x, y, z) -> (y, x, z)` (magnitudes, no sign)
//! - quaternions use `(x, y, z, w) -> (y, -x, z, w)`
//! - matrix bases are remapped componentwise, renormalized, and
//!   rebuilt as a look-at rotation from the forward and up axes
//! - extent corners are remapped; callers re-derive min/max

use glam::{Mat3, Mat4, Quat, Vec3};

/// Map a point (or normal, or translation) from the source frame to
/// the target frame.
#[inline]
pub fn point_to_target(v: Vec3) -> Vec3 {
    Vec3::new(v.y, -v.x, v.z)
}

/// Inverse of [`point_to_target`].
#[inline]
pub fn point_to_source(v: Vec3) -> Vec3 {
    Vec3::new(-v.y, v.x, v.z)
}

/// Map a scale vector between frames. Scales are magnitudes, so the
/// axes swap without a sign flip.
#[inline]
pub fn scale_to_target(v: Vec3) -> Vec3 {
    Vec3::new(v.y, v.x, v.z)
}

/// Inverse of [`scale_to_target`] (the swap is its own inverse).
#[inline]
pub fn scale_to_source(v: Vec3) -> Vec3 {
    scale_to_target(v)
}

/// Map a quaternion from the source frame to the target frame.
#[inline]
pub fn quat_to_target(q: Quat) -> Quat {
    Quat::from_xyzw(q.y, -q.x, q.z, q.w)
}

/// Inverse of [`quat_to_target`].
#[inline]
pub fn quat_to_source(q: Quat) -> Quat {
    Quat::from_xyzw(-q.y, q.x, q.z, q.w)
}

/// Map an axis-aligned extent from the source frame to the target
/// frame. Both corners are remapped and a valid min/max pair is
/// re-derived, since the mapping permutes and negates axes.
pub fn extent_to_target(min: Vec3, max: Vec3) -> (Vec3, Vec3) {
    let a = point_to_target(min);
    let b = point_to_target(max);
    (a.min(b), a.max(b))
}

/// Build a target-frame rotation that faces `forward` with `up`
/// roughly along the vertical.
///
/// The target frame is X-forward, Y-right, Z-up (right-handed), so
/// the rotation's X axis is the normalized forward vector, Y is
/// `up x forward`, and Z is recomputed to keep the basis orthonormal.
/// Degenerate input falls back to the identity rotation.
pub fn rotation_from_basis(forward: Vec3, up: Vec3) -> Quat {
    let f = forward.normalize_or_zero();
    if f == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let mut u = up.normalize_or_zero();
    if u == Vec3::ZERO || u.cross(f).length_squared() < 1e-10 {
        // Forward and up are parallel (or up is missing); pick a
        // stand-in vertical that is not colinear with forward.
        u = if f.z.abs() < 0.9 { Vec3::Z } else { Vec3::X };
    }
    let r = u.cross(f).normalize();
    let u = f.cross(r);
    Quat::from_mat3(&Mat3::from_cols(f, r, u))
}

/// Decompose a source-frame matrix into target-frame
/// (position, rotation, scale).
///
/// Scale is taken from the lengths of the source basis vectors (then
/// axis-swapped), rotation from the remapped forward/up basis, and
/// position from the remapped translation.
pub fn decompose_to_target(m: &Mat4) -> (Vec3, Quat, Vec3) {
    let x_axis = m.x_axis.truncate();
    let y_axis = m.y_axis.truncate();
    let z_axis = m.z_axis.truncate();

    let position = point_to_target(m.w_axis.truncate());
    let scale = scale_to_target(Vec3::new(x_axis.length(), y_axis.length(), z_axis.length()));

    // Source Y is forward and source Z is up; remap both into the
    // target frame before rebuilding the rotation.
    let forward = point_to_target(y_axis);
    let up = point_to_target(z_axis);
    let rotation = rotation_from_basis(forward, up);

    (position, rotation, scale)
}

/// Convert a full source-frame matrix to a target-frame matrix by
/// decomposing and rebuilding. Shear is not preserved.
pub fn matrix_to_target(m: &Mat4) -> Mat4 {
    let (position, rotation, scale) = decompose_to_target(m);
    Mat4::from_scale_rotation_translation(scale, rotation, position)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn assert_vec3_near(a: Vec3, b: Vec3, eps: f32) {
        assert!(
            (a - b).length() < eps,
            "expected {:?} to be within {} of {:?}",
            a,
            eps,
            b
        );
    }

    #[test]
    fn test_point_mapping() {
        let p = point_to_target(Vec3::new(10.0, 20.0, 30.0));
        assert_eq!(p, Vec3::new(20.0, -10.0, 30.0));
    }

    #[test]
    fn test_point_mapping_is_involutive_with_inverse() {
        let p = Vec3::new(1.5, -2.25, 3.75);
        assert_vec3_near(point_to_source(point_to_target(p)), p, EPS);
        assert_vec3_near(point_to_target(point_to_source(p)), p, EPS);
    }

    #[test]
    fn test_mapping_preserves_handedness() {
        // The mapped basis must still satisfy x cross y = z.
        let x = point_to_target(Vec3::X);
        let y = point_to_target(Vec3::Y);
        let z = point_to_target(Vec3::Z);
        assert_vec3_near(x.cross(y), z, EPS);
    }

    #[test]
    fn test_scale_mapping_has_no_sign_flip() {
        let s = scale_to_target(Vec3::new(2.0, 3.0, 4.0));
        assert_eq!(s, Vec3::new(3.0, 2.0, 4.0));
        assert_eq!(scale_to_source(s), Vec3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn test_quat_mapping_round_trip() {
        let q = Quat::from_euler(glam::EulerRot::ZYX, 0.3, -0.7, 1.1);
        let back = quat_to_source(quat_to_target(q));
        assert!(back.dot(q).abs() > 1.0 - EPS);
    }

    #[test]
    fn test_quat_mapping_matches_point_mapping() {
        // Rotating then converting must equal converting then rotating
        // with the converted quaternion.
        let q = Quat::from_rotation_z(0.8) * Quat::from_rotation_x(-0.4);
        let p = Vec3::new(0.3, 1.7, -2.2);
        let a = point_to_target(q * p);
        let b = quat_to_target(q) * point_to_target(p);
        assert_vec3_near(a, b, EPS);
    }

    #[test]
    fn test_extent_corners_are_remapped_and_sorted() {
        let (min, max) = extent_to_target(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(4.0, 5.0, 6.0));
        // Source X in [-1, 4] lands on target -Y, so it flips sign.
        assert_vec3_near(min, Vec3::new(-2.0, -4.0, -3.0), EPS);
        assert_vec3_near(max, Vec3::new(5.0, 1.0, 6.0), EPS);
    }

    #[test]
    fn test_decompose_identity() {
        let (pos, rot, scale) = decompose_to_target(&Mat4::IDENTITY);
        assert_vec3_near(pos, Vec3::ZERO, EPS);
        assert_vec3_near(scale, Vec3::ONE, EPS);
        // Identity in the source frame is identity in the target frame.
        assert!(rot.dot(Quat::IDENTITY).abs() > 1.0 - EPS);
    }

    #[test]
    fn test_decompose_translation_rotation() {
        // Property: for T * R with unit scale, the extracted TRS
        // reconstructs the converted matrix up to tolerance.
        let t = Vec3::new(10.0, 20.0, 30.0);
        let r = Quat::from_rotation_z(0.6);
        let m = Mat4::from_translation(t) * Mat4::from_quat(r);

        let (pos, rot, scale) = decompose_to_target(&m);
        assert_vec3_near(pos, point_to_target(t), 1e-4);
        assert_vec3_near(scale, Vec3::ONE, 1e-4);

        // Reconstructed matrix must act like the converted original.
        let rebuilt = Mat4::from_scale_rotation_translation(scale, rot, pos);
        for p in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(1.0, 2.0, 3.0)] {
            let expect = point_to_target(m.transform_point3(point_to_source(p)));
            assert_vec3_near(rebuilt.transform_point3(p), expect, 1e-4);
        }
    }

    #[test]
    fn test_rotation_from_degenerate_basis() {
        assert!(rotation_from_basis(Vec3::ZERO, Vec3::Z).dot(Quat::IDENTITY) > 1.0 - EPS);
        // Parallel forward/up still yields a valid rotation.
        let q = rotation_from_basis(Vec3::Z, Vec3::Z);
        assert!((q.length() - 1.0).abs() < EPS);
    }
}
