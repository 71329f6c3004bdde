/*!
Recording backend used by the unit tests.

Joint metadata and poses are canned at construction; every write issued
by an addon is recorded so the tests can assert on the exact commands
sent to the simulation.
*/

use std::sync::Mutex;

use super::{BodyId, CameraImage, ControlMode, JointId, JointInfo, MotorBatch, PhysicsBackend, Pose};

extern crate nalgebra as na;
use na::{Matrix4, SVector, UnitQuaternion};

#[derive(Debug)]
pub struct MockJoint {
    pub info: JointInfo,
    pub position: f32,
    pub link_world_position: SVector<f32, 3>,
}

#[derive(Debug)]
pub struct MockBackend {
    pub joints: Vec<MockJoint>,
    pub base: Pose,
    /// (joint, position) pairs written through `reset_joint_state`.
    pub reset_calls: Vec<(JointId, f32)>,
    /// Every batch received, in order.
    pub batches: Vec<MotorBatch>,
    pub debug_lines: Vec<(SVector<f32, 3>, SVector<f32, 3>, [f32; 3])>,
    pub clear_count: usize,
    /// Joint indices read through `joint_position`.
    pub position_reads: Mutex<Vec<JointId>>,
    /// Canned image returned by `render_camera`.
    pub image: Option<CameraImage>,
    pub render_calls: Vec<(u32, u32, Matrix4<f32>, Matrix4<f32>, bool)>,
}

impl MockBackend {
    pub fn new(joints: Vec<MockJoint>) -> Self {
        Self {
            joints,
            base: Pose {
                position: SVector::<f32, 3>::zeros(),
                orientation: UnitQuaternion::identity(),
            },
            reset_calls: Vec::new(),
            batches: Vec::new(),
            debug_lines: Vec::new(),
            clear_count: 0,
            position_reads: Mutex::new(Vec::new()),
            image: None,
            render_calls: Vec::new(),
        }
    }

    /// Backend with `limits.len()` revolute joints named `joint_0`,
    /// `joint_1`, ... with the given (lower, upper, force, velocity)
    /// limits, all at position 0.
    pub fn with_limits(limits: &[(f32, f32, f32, f32)]) -> Self {
        let joints = limits
            .iter()
            .enumerate()
            .map(|(i, &(lower, upper, force, velocity))| MockJoint {
                info: JointInfo {
                    joint_id: i,
                    name: format!("joint_{}", i),
                    has_dof: true,
                    lower_limit: lower,
                    upper_limit: upper,
                    max_force: force,
                    max_velocity: velocity,
                },
                position: 0.,
                link_world_position: SVector::<f32, 3>::new(i as f32, 0., 0.),
            })
            .collect();
        Self::new(joints)
    }

    pub fn last_batch(&self) -> &MotorBatch {
        self.batches.last().expect("no motor batch recorded")
    }

    pub fn make_fixed(&mut self, joint: JointId) {
        self.joints[joint].info.has_dof = false;
    }

    pub fn set_position(&mut self, joint: JointId, position: f32) {
        self.joints[joint].position = position;
    }
}

impl PhysicsBackend for MockBackend {
    fn num_joints(&self, _body: BodyId) -> usize {
        self.joints.len()
    }

    fn joint_info(&self, _body: BodyId, joint: JointId) -> JointInfo {
        self.joints[joint].info.clone()
    }

    fn joint_position(&self, _body: BodyId, joint: JointId) -> f32 {
        self.position_reads.lock().unwrap().push(joint);
        self.joints[joint].position
    }

    fn reset_joint_state(&mut self, _body: BodyId, joint: JointId, position: f32) {
        self.joints[joint].position = position;
        self.reset_calls.push((joint, position));
    }

    fn apply_motor_batch(&mut self, _body: BodyId, batch: &MotorBatch) {
        assert_eq!(batch.forces.len(), batch.joint_ids.len());
        assert_eq!(batch.position_gains.len(), batch.joint_ids.len());
        assert_eq!(batch.velocity_gains.len(), batch.joint_ids.len());
        if let Some(targets) = &batch.target_positions {
            assert_eq!(targets.len(), batch.joint_ids.len());
            assert_eq!(batch.mode, ControlMode::Position);
        }
        self.batches.push(batch.clone());
    }

    fn link_world_position(&self, _body: BodyId, link: JointId) -> SVector<f32, 3> {
        self.joints[link].link_world_position
    }

    fn link_pose(&self, _body: BodyId, link: JointId) -> Pose {
        Pose {
            position: self.joints[link].link_world_position,
            orientation: UnitQuaternion::identity(),
        }
    }

    fn base_pose(&self, _body: BodyId) -> Pose {
        self.base.clone()
    }

    fn render_camera(
        &mut self,
        width: u32,
        height: u32,
        view: &Matrix4<f32>,
        projection: &Matrix4<f32>,
        segmentation: bool,
    ) -> CameraImage {
        self.render_calls
            .push((width, height, *view, *projection, segmentation));
        match &self.image {
            Some(image) => image.clone(),
            None => CameraImage {
                width,
                height,
                rgba: vec![0; (width * height * 4) as usize],
                depth_buffer: vec![1.; (width * height) as usize],
                segmentation: if segmentation {
                    Some(vec![-1; (width * height) as usize])
                } else {
                    None
                },
            },
        }
    }

    fn add_debug_line(
        &mut self,
        from: SVector<f32, 3>,
        to: SVector<f32, 3>,
        color: [f32; 3],
        _width: f32,
        _lifetime: f32,
    ) {
        self.debug_lines.push((from, to, color));
    }

    fn clear_debug_items(&mut self) {
        self.debug_lines.clear();
        self.clear_count += 1;
    }
}
