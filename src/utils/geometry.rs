extern crate nalgebra as na;
use na::{Isometry3, Translation3, UnitQuaternion};

use crate::backend::Pose;

/// Isometry from a translation and roll/pitch/yaw Euler angles.
pub fn isometry_from_xyz_rpy(xyz: [f32; 3], rpy: [f32; 3]) -> Isometry3<f32> {
    Isometry3::from_parts(
        Translation3::new(xyz[0], xyz[1], xyz[2]),
        UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2]),
    )
}

/// Isometry of a backend pose.
pub fn isometry_from_pose(pose: &Pose) -> Isometry3<f32> {
    Isometry3::from_parts(
        Translation3::new(pose.position.x, pose.position.y, pose.position.z),
        pose.orientation,
    )
}
