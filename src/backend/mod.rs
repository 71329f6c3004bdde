/*!
Interface to the external physics/rendering backend.

The simulation itself (rigid-body dynamics, collision handling,
rasterization) is not implemented here: the addons talk to it through
the [`PhysicsBackend`] trait, injected at construction time. One
implementation of the trait wraps one simulation session.
*/

use std::sync::{Arc, RwLock};

use serde_derive::{Deserialize, Serialize};

extern crate nalgebra as na;
use na::{Matrix4, SVector, UnitQuaternion};

#[cfg(test)]
pub mod mock;

/// Backend-assigned identifier of a multi-joint body.
pub type BodyId = i32;
/// Backend-assigned joint (and link) index within a body.
pub type JointId = usize;

/// Per-joint metadata, read once at addon construction.
#[derive(Debug, Clone)]
pub struct JointInfo {
    pub joint_id: JointId,
    pub name: String,
    /// Fixed joints report `false` and are never controlled.
    pub has_dof: bool,
    pub lower_limit: f32,
    pub upper_limit: f32,
    pub max_force: f32,
    pub max_velocity: f32,
}

/// Low-level motor control mode of a joint set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    Position,
    Velocity,
    Torque,
}

/// One batched motor command: every controlled joint of a body at once.
///
/// All per-joint vectors have the same length and the same ordering as
/// `joint_ids`, which is fixed by the issuing controller.
#[derive(Debug, Clone)]
pub struct MotorBatch {
    pub mode: ControlMode,
    pub joint_ids: Vec<JointId>,
    pub target_positions: Option<Vec<f32>>,
    pub target_velocities: Option<Vec<f32>>,
    pub forces: Vec<f32>,
    pub position_gains: Vec<f32>,
    pub velocity_gains: Vec<f32>,
}

/// Position and orientation of a body or link in world coordinates.
#[derive(Debug, Clone)]
pub struct Pose {
    pub position: SVector<f32, 3>,
    pub orientation: UnitQuaternion<f32>,
}

/// Raw rendering output of one camera call.
#[derive(Debug, Clone)]
pub struct CameraImage {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA, 4 bytes per pixel.
    pub rgba: Vec<u8>,
    /// Row-major depth buffer, normalized to [0, 1].
    pub depth_buffer: Vec<f32>,
    /// Row-major per-pixel object ids, if segmentation was requested.
    pub segmentation: Option<Vec<i32>>,
}

/// Opaque collaborator giving access to one simulation session.
///
/// Addons hold a [`SharedBackend`] plus the [`BodyId`] of the body they
/// are attached to; both are passed at construction, never taken from a
/// process-wide context.
pub trait PhysicsBackend: std::fmt::Debug + std::marker::Send + std::marker::Sync {
    fn num_joints(&self, body: BodyId) -> usize;
    fn joint_info(&self, body: BodyId, joint: JointId) -> JointInfo;
    fn joint_position(&self, body: BodyId, joint: JointId) -> f32;

    /// Write a joint's position directly, bypassing dynamics. A
    /// teleport, not a simulated motion.
    fn reset_joint_state(&mut self, body: BodyId, joint: JointId, position: f32);

    /// Apply one batched motor command to a body.
    fn apply_motor_batch(&mut self, body: BodyId, batch: &MotorBatch);

    fn link_world_position(&self, body: BodyId, link: JointId) -> SVector<f32, 3>;
    fn link_pose(&self, body: BodyId, link: JointId) -> Pose;
    fn base_pose(&self, body: BodyId) -> Pose;

    /// Render one camera image with the given view and projection
    /// matrices (OpenGL conventions).
    fn render_camera(
        &mut self,
        width: u32,
        height: u32,
        view: &Matrix4<f32>,
        projection: &Matrix4<f32>,
        segmentation: bool,
    ) -> CameraImage;

    /// Draw a transient colored line segment in world space.
    fn add_debug_line(
        &mut self,
        from: SVector<f32, 3>,
        to: SVector<f32, 3>,
        color: [f32; 3],
        width: f32,
        lifetime: f32,
    );

    /// Remove every debug item previously drawn.
    fn clear_debug_items(&mut self);
}

/// Backend handle shared between the addons of one session.
pub type SharedBackend = Arc<RwLock<dyn PhysicsBackend>>;
