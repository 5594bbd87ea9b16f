//! Node transforms as written to USD.
//!
//! Matrices use glam's column-vector convention. `compose(world, pose, root)`
//! returns `root * pose * world`, which is `world × pose × root` in the
//! row-vector notation USD prints: the node's world transform is applied
//! first, then the model pose, then the root transform.

use glam::{Mat4, Quat, Vec3};

/// Compose a node's world matrix with its model pose and the package root.
pub fn compose(world: Mat4, pose: Mat4, root: Mat4) -> Mat4 {
    root * pose * world
}

/// A matrix split into independent translate, rotate and scale ops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecomposedTransform {
    pub translation: Vec3,
    /// XYZ Euler angles in degrees.
    pub rotation_xyz: Vec3,
    pub scale: Vec3,
}

/// Split `matrix` into translation, XYZ rotation and scale.
///
/// Shear cannot be represented and is dropped. Degenerate matrices yield
/// whatever glam's decomposition produces.
pub fn decompose(matrix: &Mat4) -> DecomposedTransform {
    let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
    DecomposedTransform {
        translation,
        rotation_xyz: quat_to_euler_xyz(rotation),
        scale,
    }
}

/// Convert a quaternion to the angles of USD's `rotateXYZ` op in degrees.
///
/// The rotation applies X first, then Y, then Z. The Y angle is clamped to
/// ±90 degrees when its sine reaches ±1.
pub fn quat_to_euler_xyz(q: Quat) -> Vec3 {
    let sin_x_cos_y = 2.0 * (q.w * q.x + q.y * q.z);
    let cos_x_cos_y = 1.0 - 2.0 * (q.x * q.x + q.y * q.y);
    let x = sin_x_cos_y.atan2(cos_x_cos_y);

    let sin_y = 2.0 * (q.w * q.y - q.z * q.x);
    let y = if sin_y.abs() >= 1.0 {
        std::f32::consts::FRAC_PI_2.copysign(sin_y)
    } else {
        sin_y.asin()
    };

    let sin_z_cos_y = 2.0 * (q.w * q.z + q.x * q.y);
    let cos_z_cos_y = 1.0 - 2.0 * (q.y * q.y + q.z * q.z);
    let z = sin_z_cos_y.atan2(cos_z_cos_y);

    Vec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::EulerRot;

    fn euler_xyz_to_quat(degrees: Vec3) -> Quat {
        Quat::from_euler(
            EulerRot::ZYX,
            degrees.z.to_radians(),
            degrees.y.to_radians(),
            degrees.x.to_radians(),
        )
    }

    fn assert_vec3_eq(expected: Vec3, actual: Vec3) {
        assert_relative_eq!(expected.x, actual.x, epsilon = 1e-4);
        assert_relative_eq!(expected.y, actual.y, epsilon = 1e-4);
        assert_relative_eq!(expected.z, actual.z, epsilon = 1e-4);
    }

    #[test]
    fn compose_identity() {
        assert_eq!(
            Mat4::IDENTITY,
            compose(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
        );
    }

    #[test]
    fn compose_applies_world_then_pose_then_root() {
        let world = Mat4::from_translation(Vec3::X);
        let pose = Mat4::from_scale(Vec3::splat(2.0));
        let root = Mat4::from_translation(Vec3::Y);

        let point = compose(world, pose, root).transform_point3(Vec3::ZERO);
        assert_vec3_eq(Vec3::new(2.0, 1.0, 0.0), point);
    }

    #[test]
    fn decompose_translation_and_scale() {
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::IDENTITY,
            Vec3::new(4.0, 5.0, 6.0),
        );
        let decomposed = decompose(&matrix);
        assert_vec3_eq(Vec3::new(4.0, 5.0, 6.0), decomposed.translation);
        assert_vec3_eq(Vec3::new(1.0, 2.0, 3.0), decomposed.scale);
        assert_vec3_eq(Vec3::ZERO, decomposed.rotation_xyz);
    }

    #[test]
    fn euler_single_axis() {
        assert_vec3_eq(
            Vec3::new(90.0, 0.0, 0.0),
            quat_to_euler_xyz(Quat::from_rotation_x(90f32.to_radians())),
        );
        assert_vec3_eq(
            Vec3::new(0.0, 45.0, 0.0),
            quat_to_euler_xyz(Quat::from_rotation_y(45f32.to_radians())),
        );
        assert_vec3_eq(
            Vec3::new(0.0, 0.0, -30.0),
            quat_to_euler_xyz(Quat::from_rotation_z(-30f32.to_radians())),
        );
    }

    #[test]
    fn euler_round_trip() {
        let angles = Vec3::new(10.0, -20.0, 30.0);
        assert_vec3_eq(angles, quat_to_euler_xyz(euler_xyz_to_quat(angles)));
    }

    #[test]
    fn euler_clamps_gimbal_lock() {
        let euler = quat_to_euler_xyz(Quat::from_rotation_y(90f32.to_radians()));
        assert_relative_eq!(90.0, euler.y, epsilon = 0.05);

        let euler = quat_to_euler_xyz(Quat::from_rotation_y(-90f32.to_radians()));
        assert_relative_eq!(-90.0, euler.y, epsilon = 0.05);
    }

    #[test]
    fn decompose_drops_shear() {
        let shear = Mat4::from_cols_array(&[
            1.0, 0.0, 0.0, 0.0, //
            0.5, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        let decomposed = decompose(&shear);
        let rebuilt = Mat4::from_scale_rotation_translation(
            decomposed.scale,
            euler_xyz_to_quat(decomposed.rotation_xyz),
            decomposed.translation,
        );
        assert!(!rebuilt.abs_diff_eq(shear, 1e-4));
    }
}
