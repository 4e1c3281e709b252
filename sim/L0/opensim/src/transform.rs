//! Homogeneous transform algebra.
//!
//! Joint chains are folded as 4×4 homogeneous matrices; orientations enter
//! and leave as unit quaternions so that long compositions do not accumulate
//! gimbal error.

use nalgebra::{Matrix3, Matrix4, Unit, UnitQuaternion, Vector3};

/// Build a homogeneous transform from a translation and an orientation.
#[must_use]
pub fn homogeneous(translation: &Vector3<f64>, rotation: &UnitQuaternion<f64>) -> Matrix4<f64> {
    let mut m = rotation.to_homogeneous();
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    m
}

/// Compose two transforms: `a` followed by `b` in `a`'s frame.
#[must_use]
pub fn compose(a: &Matrix4<f64>, b: &Matrix4<f64>) -> Matrix4<f64> {
    a * b
}

/// Invert a rigid transform.
///
/// Uses the transpose of the rotation block, which is exact for rigid
/// transforms and never fails.
#[must_use]
pub fn invert(m: &Matrix4<f64>) -> Matrix4<f64> {
    let r_t: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).transpose();
    let t: Vector3<f64> = m.fixed_view::<3, 1>(0, 3).into_owned();
    let mut inv = Matrix4::identity();
    inv.fixed_view_mut::<3, 3>(0, 0).copy_from(&r_t);
    inv.fixed_view_mut::<3, 1>(0, 3).copy_from(&(-(r_t * t)));
    inv
}

/// Split a transform into translation and orientation.
///
/// The rotation block is re-orthonormalised, so small drift from chained
/// products does not leak into the quaternion.
#[must_use]
pub fn decompose(m: &Matrix4<f64>) -> (Vector3<f64>, UnitQuaternion<f64>) {
    let translation: Vector3<f64> = m.fixed_view::<3, 1>(0, 3).into_owned();
    let rotation: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    (translation, UnitQuaternion::from_matrix(&rotation))
}

/// Orientation from three sequential body-fixed rotations: X, then Y, then Z.
///
/// `q = Rx * Ry * Rz`. The order is fixed by the source format.
#[must_use]
pub fn body_fixed_xyz(angles: &Vector3<f64>) -> UnitQuaternion<f64> {
    let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), angles.x);
    let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angles.y);
    let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angles.z);
    rx * ry * rz
}

/// Rotation by `angle` radians about `axis`.
///
/// A zero-length axis yields the identity.
#[must_use]
pub fn rotation_about(axis: &Vector3<f64>, angle: f64) -> Matrix4<f64> {
    match Unit::try_new(*axis, 1e-12) {
        Some(axis) => UnitQuaternion::from_axis_angle(&axis, angle).to_homogeneous(),
        None => Matrix4::identity(),
    }
}

/// Translation by `value` along `axis`.
#[must_use]
pub fn translation_along(axis: &Vector3<f64>, value: f64) -> Matrix4<f64> {
    Matrix4::new_translation(&(axis * value))
}

/// Rotation that stands a Y-up model upright in a Z-up world.
#[must_use]
pub fn upright() -> Matrix4<f64> {
    rotation_about(&Vector3::x(), std::f64::consts::FRAC_PI_2)
}

/// Quaternion as `[w, x, y, z]`, the target format's ordering.
#[must_use]
pub fn quat_to_wxyz(q: &UnitQuaternion<f64>) -> [f64; 4] {
    let qi = q.into_inner();
    [qi.w, qi.i, qi.j, qi.k]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_homogeneous_applies_rotation_then_translation() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        let m = homogeneous(&Vector3::new(1.0, 0.0, 0.0), &q);
        let p = m.transform_point(&nalgebra::Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invert_is_inverse() {
        let q = body_fixed_xyz(&Vector3::new(0.3, -0.2, 1.1));
        let m = homogeneous(&Vector3::new(0.5, -1.0, 2.0), &q);
        let product = compose(&m, &invert(&m));
        assert_relative_eq!(product, Matrix4::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_decompose_round_trip() {
        let t = Vector3::new(-0.0707, -0.0661, 0.0835);
        let q = body_fixed_xyz(&Vector3::new(0.1, 0.2, 0.3));
        let (t2, q2) = decompose(&homogeneous(&t, &q));
        assert_relative_eq!(t, t2, epsilon = 1e-12);
        assert!(q.angle_to(&q2) < 1e-9);
    }

    #[test]
    fn test_body_fixed_order() {
        // Rx * Ry * Rz, not Rz * Ry * Rx
        let angles = Vector3::new(0.4, 0.5, 0.6);
        let q = body_fixed_xyz(&angles);
        let extrinsic = UnitQuaternion::from_euler_angles(0.4, 0.5, 0.6);
        assert!(q.angle_to(&extrinsic) > 1e-3);

        let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.4);
        let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.5);
        let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.6);
        assert!(q.angle_to(&(rx * ry * rz)) < 1e-12);
    }

    #[test]
    fn test_zero_axis_rotation_is_identity() {
        assert_eq!(rotation_about(&Vector3::zeros(), 1.0), Matrix4::identity());
    }

    #[test]
    fn test_upright_maps_y_to_z() {
        let p = upright().transform_vector(&Vector3::y());
        assert_relative_eq!(p, Vector3::z(), epsilon = 1e-12);
    }
}
