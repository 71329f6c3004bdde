/*!
Provides the [`JointController`], which maps a per-timestep action
vector straight onto batched joint motor targets: positions, velocities
or torques depending on the configured control mode, with the two base
gains applied uniformly.
*/

use log::debug;
use serde_derive::{Deserialize, Serialize};

use crate::backend::{BodyId, ControlMode, JointId, MotorBatch, PhysicsBackend, SharedBackend};
use crate::errors::{RobokitError, RobokitErrorTypes, RobokitResult};
use crate::utils::determinist_random_variable::{
    DeterministRandomVariable, DeterministRandomVariableFactory,
};

use super::{ActionSpace, Addon};

/// Configuration of the [`JointController`].
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
#[serde(deny_unknown_fields)]
pub struct JointControllerConfig {
    /// Low-level control mode: position, velocity or torque.
    pub control_mode: ControlMode,
    /// Base position gain of the motor servo.
    pub position_gain: f32,
    /// Base velocity gain of the motor servo.
    pub velocity_gain: f32,
    /// Control a single named joint.
    pub joint: Option<String>,
    /// Control an explicit list of named joints. Without `joint` nor
    /// `joints`, every non-fixed joint of the body is controlled.
    pub joints: Option<Vec<String>>,
    /// Per-joint position the joints are reset to, defaults to zero.
    pub rest_position: Option<Vec<f32>>,
    /// Per-joint upper bound of the uniform reset offset, defaults to
    /// zero (no randomization).
    pub reset_range: Option<Vec<f32>>,
    /// Broadcast a single scalar action to all the controlled joints.
    pub joined: bool,
}

impl Default for JointControllerConfig {
    fn default() -> Self {
        Self {
            control_mode: ControlMode::Velocity,
            position_gain: 0.015,
            velocity_gain: 1.0,
            joint: None,
            joints: None,
            rest_position: None,
            reset_range: None,
            joined: false,
        }
    }
}

/// One controlled joint: backend metadata plus reset settings. Built
/// once at construction, immutable afterwards.
#[derive(Debug, Clone)]
pub struct JointSpec {
    pub joint_id: JointId,
    pub name: String,
    pub lower_limit: f32,
    pub upper_limit: f32,
    pub max_force: f32,
    pub max_velocity: f32,
    pub rest_position: f32,
    pub reset_range: f32,
}

/// Resolve the controlled joint subset of `body`.
///
/// Named joints must exist; fixed joints are excluded even if named.
/// `rest_position` and `reset_range` must either be absent or match the
/// selected joint count.
pub(crate) fn resolve_joint_specs(
    backend: &dyn PhysicsBackend,
    body: BodyId,
    joint: &Option<String>,
    joints: &Option<Vec<String>>,
    rest_position: &Option<Vec<f32>>,
    reset_range: &Option<Vec<f32>>,
) -> RobokitResult<Vec<JointSpec>> {
    let all: Vec<_> = (0..backend.num_joints(body))
        .map(|i| backend.joint_info(body, i))
        .collect();

    let selected_names: Vec<String> = if let Some(name) = joint {
        vec![name.clone()]
    } else if let Some(names) = joints {
        names.clone()
    } else {
        all.iter().map(|info| info.name.clone()).collect()
    };

    for name in &selected_names {
        if !all.iter().any(|info| &info.name == name) {
            return Err(RobokitError::new(
                RobokitErrorTypes::ConfigError,
                format!("joint `{}` not found on body {}", name, body),
            ));
        }
    }

    let selected: Vec<_> = all
        .into_iter()
        .filter(|info| selected_names.contains(&info.name) && info.has_dof)
        .collect();

    let check_len = |label: &str, values: &Option<Vec<f32>>| -> RobokitResult<()> {
        if let Some(values) = values {
            if values.len() != selected.len() {
                return Err(RobokitError::new(
                    RobokitErrorTypes::ConfigError,
                    format!(
                        "`{}` has {} entries for {} controlled joints",
                        label,
                        values.len(),
                        selected.len()
                    ),
                ));
            }
        }
        Ok(())
    };
    check_len("rest_position", rest_position)?;
    check_len("reset_range", reset_range)?;

    Ok(selected
        .into_iter()
        .enumerate()
        .map(|(i, info)| JointSpec {
            joint_id: info.joint_id,
            name: info.name,
            lower_limit: info.lower_limit,
            upper_limit: info.upper_limit,
            max_force: info.max_force,
            max_velocity: info.max_velocity,
            rest_position: rest_position.as_ref().map_or(0., |v| v[i]),
            reset_range: reset_range.as_ref().map_or(0., |v| v[i]),
        })
        .collect())
}

/// Fixed-gain joint motor controller.
#[derive(Debug)]
pub struct JointController {
    backend: SharedBackend,
    body: BodyId,
    control_mode: ControlMode,
    position_gain: f32,
    velocity_gain: f32,
    joined: bool,
    joints: Vec<JointSpec>,
    action_space: ActionSpace,
    reset_noise: Box<dyn DeterministRandomVariable>,
}

impl JointController {
    /// Makes a new [`JointController`] from the given config. The body
    /// and its joints must already exist in the backend.
    pub fn from_config(
        config: &JointControllerConfig,
        backend: SharedBackend,
        body: BodyId,
        va_factory: &DeterministRandomVariableFactory,
    ) -> RobokitResult<Self> {
        let joints = resolve_joint_specs(
            &*backend.read().unwrap(),
            body,
            &config.joint,
            &config.joints,
            &config.rest_position,
            &config.reset_range,
        )?;
        debug!(
            "JointController on body {}: {} joints in {:?} mode",
            body,
            joints.len(),
            config.control_mode
        );

        let action_space = match config.control_mode {
            ControlMode::Torque => ActionSpace::new(
                joints.iter().map(|j| -j.max_force).collect(),
                joints.iter().map(|j| j.max_force).collect(),
            ),
            ControlMode::Velocity => ActionSpace::new(
                joints.iter().map(|j| -j.max_velocity).collect(),
                joints.iter().map(|j| j.max_velocity).collect(),
            ),
            ControlMode::Position => ActionSpace::new(
                joints.iter().map(|j| -j.lower_limit).collect(),
                joints.iter().map(|j| j.upper_limit).collect(),
            ),
        };

        Ok(Self {
            backend,
            body,
            control_mode: config.control_mode,
            position_gain: config.position_gain,
            velocity_gain: config.velocity_gain,
            joined: config.joined,
            joints,
            action_space,
            reset_noise: va_factory.make_unit_uniform(va_factory.next_unique_seed()),
        })
    }

    pub fn joints(&self) -> &[JointSpec] {
        &self.joints
    }

    /// Broadcast or validate the raw action against the controlled
    /// joint count.
    fn expand_action(joined: bool, n_joints: usize, action: &[f32]) -> RobokitResult<Vec<f32>> {
        if joined {
            if action.len() != 1 {
                return Err(RobokitError::new(
                    RobokitErrorTypes::InvalidActionShape,
                    format!("joined controller expects 1 action, got {}", action.len()),
                ));
            }
            Ok(vec![action[0]; n_joints])
        } else if action.len() != n_joints {
            Err(RobokitError::new(
                RobokitErrorTypes::InvalidActionShape,
                format!("expected {} actions, got {}", n_joints, action.len()),
            ))
        } else {
            Ok(action.to_vec())
        }
    }
}

/// Draw the reset position of each joint and write it to the backend.
///
/// Shared by both controller variants: offset uniform in
/// [0, reset_range], added to the rest position, written directly.
pub(crate) fn reset_joint_states(
    backend: &SharedBackend,
    body: BodyId,
    joints: &[JointSpec],
    noise: &mut dyn DeterministRandomVariable,
) {
    let mut backend = backend.write().unwrap();
    for spec in joints {
        let offset = noise.gen() * spec.reset_range;
        backend.reset_joint_state(body, spec.joint_id, spec.rest_position + offset);
    }
}

impl Addon for JointController {
    fn reset(&mut self) -> RobokitResult<()> {
        reset_joint_states(
            &self.backend,
            self.body,
            &self.joints,
            self.reset_noise.as_mut(),
        );
        Ok(())
    }

    fn update(&mut self, action: &[f32]) -> RobokitResult<()> {
        let action = Self::expand_action(self.joined, self.joints.len(), action)?;
        let n = action.len();
        let joint_ids: Vec<JointId> = self.joints.iter().map(|j| j.joint_id).collect();
        let torque_limits: Vec<f32> = self.joints.iter().map(|j| j.max_force).collect();

        let batch = match self.control_mode {
            ControlMode::Position => MotorBatch {
                mode: ControlMode::Position,
                joint_ids,
                target_positions: Some(action),
                target_velocities: Some(vec![0.; n]),
                forces: torque_limits,
                position_gains: vec![self.position_gain; n],
                velocity_gains: vec![self.velocity_gain; n],
            },
            ControlMode::Velocity => MotorBatch {
                mode: ControlMode::Velocity,
                joint_ids,
                target_positions: None,
                target_velocities: Some(action),
                forces: torque_limits,
                position_gains: vec![self.position_gain; n],
                velocity_gains: vec![self.velocity_gain; n],
            },
            ControlMode::Torque => MotorBatch {
                mode: ControlMode::Torque,
                joint_ids,
                target_positions: None,
                target_velocities: None,
                forces: action,
                position_gains: vec![self.position_gain; n],
                velocity_gains: vec![self.velocity_gain; n],
            },
        };

        self.backend.write().unwrap().apply_motor_batch(self.body, &batch);
        Ok(())
    }

    fn action_space(&self) -> Option<&ActionSpace> {
        Some(&self.action_space)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use std::sync::{Arc, RwLock};

    fn shared(mock: MockBackend) -> (Arc<RwLock<MockBackend>>, SharedBackend) {
        let arc = Arc::new(RwLock::new(mock));
        let backend: SharedBackend = arc.clone();
        (arc, backend)
    }

    fn two_joint_backend() -> MockBackend {
        // (lower, upper, force, velocity)
        MockBackend::with_limits(&[(-1., 1., 10., 2.), (-0.5, 1.5, 20., 4.)])
    }

    #[test]
    fn velocity_action_space_is_symmetric() {
        let (_mock, backend) = shared(two_joint_backend());
        let controller = JointController::from_config(
            &JointControllerConfig::default(),
            backend,
            0,
            &DeterministRandomVariableFactory::default(),
        )
        .unwrap();
        let space = controller.action_space().unwrap();
        assert_eq!(space.low, vec![-2., -4.]);
        assert_eq!(space.high, vec![2., 4.]);
    }

    #[test]
    fn torque_action_space_uses_force_limits() {
        let (_mock, backend) = shared(two_joint_backend());
        let config = JointControllerConfig {
            control_mode: ControlMode::Torque,
            ..Default::default()
        };
        let controller = JointController::from_config(
            &config,
            backend,
            0,
            &DeterministRandomVariableFactory::default(),
        )
        .unwrap();
        let space = controller.action_space().unwrap();
        assert_eq!(space.low, vec![-10., -20.]);
        assert_eq!(space.high, vec![10., 20.]);
    }

    #[test]
    fn position_action_space_uses_joint_limits() {
        let (_mock, backend) = shared(two_joint_backend());
        let config = JointControllerConfig {
            control_mode: ControlMode::Position,
            ..Default::default()
        };
        let controller = JointController::from_config(
            &config,
            backend,
            0,
            &DeterministRandomVariableFactory::default(),
        )
        .unwrap();
        let space = controller.action_space().unwrap();
        assert_eq!(space.low, vec![1., 0.5]);
        assert_eq!(space.high, vec![1., 1.5]);
    }

    #[test]
    fn fixed_joints_are_excluded() {
        let mut mock = MockBackend::with_limits(&[(-1., 1., 10., 2.); 3]);
        mock.make_fixed(1);
        let (_mock, backend) = shared(mock);
        let controller = JointController::from_config(
            &JointControllerConfig::default(),
            backend,
            0,
            &DeterministRandomVariableFactory::default(),
        )
        .unwrap();
        assert_eq!(controller.action_space().unwrap().len(), 2);
        let ids: Vec<_> = controller.joints().iter().map(|j| j.joint_id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn velocity_update_issues_one_batch() {
        let (mock, backend) = shared(two_joint_backend());
        let mut controller = JointController::from_config(
            &JointControllerConfig::default(),
            backend,
            0,
            &DeterministRandomVariableFactory::default(),
        )
        .unwrap();
        controller.update(&[1.0, -1.0]).unwrap();

        let mock = mock.read().unwrap();
        assert_eq!(mock.batches.len(), 1);
        let batch = mock.last_batch();
        assert_eq!(batch.mode, ControlMode::Velocity);
        assert_eq!(batch.joint_ids, vec![0, 1]);
        assert_eq!(batch.target_velocities, Some(vec![1.0, -1.0]));
        assert_eq!(batch.forces, vec![10., 20.]);
        assert_eq!(batch.position_gains, vec![0.015, 0.015]);
        assert_eq!(batch.velocity_gains, vec![1.0, 1.0]);
    }

    #[test]
    fn joined_broadcasts_scalar_action() {
        let mock = MockBackend::with_limits(&[(-1., 1., 10., 2.); 3]);
        let (mock, backend) = shared(mock);
        let config = JointControllerConfig {
            joined: true,
            ..Default::default()
        };
        let mut controller = JointController::from_config(
            &config,
            backend,
            0,
            &DeterministRandomVariableFactory::default(),
        )
        .unwrap();
        controller.update(&[0.5]).unwrap();
        let mock = mock.read().unwrap();
        assert_eq!(
            mock.last_batch().target_velocities,
            Some(vec![0.5, 0.5, 0.5])
        );
    }

    #[test]
    fn wrong_action_length_is_rejected() {
        let (mock, backend) = shared(two_joint_backend());
        let mut controller = JointController::from_config(
            &JointControllerConfig::default(),
            backend,
            0,
            &DeterministRandomVariableFactory::default(),
        )
        .unwrap();
        let error = controller.update(&[1.0]).unwrap_err();
        assert_eq!(error.error_type(), RobokitErrorTypes::InvalidActionShape);
        assert!(mock.read().unwrap().batches.is_empty());
    }

    #[test]
    fn unknown_joint_name_fails_construction() {
        let (_mock, backend) = shared(two_joint_backend());
        let config = JointControllerConfig {
            joint: Some("gripper".to_string()),
            ..Default::default()
        };
        let error = JointController::from_config(
            &config,
            backend,
            0,
            &DeterministRandomVariableFactory::default(),
        )
        .unwrap_err();
        assert_eq!(error.error_type(), RobokitErrorTypes::ConfigError);
    }

    #[test]
    fn mismatched_rest_position_fails_construction() {
        let (_mock, backend) = shared(two_joint_backend());
        let config = JointControllerConfig {
            rest_position: Some(vec![0.1]),
            ..Default::default()
        };
        let error = JointController::from_config(
            &config,
            backend,
            0,
            &DeterministRandomVariableFactory::default(),
        )
        .unwrap_err();
        assert_eq!(error.error_type(), RobokitErrorTypes::ConfigError);
    }

    #[test]
    fn reset_stays_within_configured_range() {
        let (mock, backend) = shared(two_joint_backend());
        let config = JointControllerConfig {
            rest_position: Some(vec![0.2, -0.3]),
            reset_range: Some(vec![0.1, 0.4]),
            ..Default::default()
        };
        let mut controller = JointController::from_config(
            &config,
            backend,
            0,
            &DeterministRandomVariableFactory::new(11),
        )
        .unwrap();
        for _ in 0..20 {
            controller.reset().unwrap();
        }
        let mock = mock.read().unwrap();
        assert_eq!(mock.reset_calls.len(), 40);
        for &(joint, position) in &mock.reset_calls {
            let (rest, range) = if joint == 0 { (0.2, 0.1) } else { (-0.3, 0.4) };
            assert!(
                (rest..=rest + range).contains(&position),
                "joint {} reset to {} outside [{}, {}]",
                joint,
                position,
                rest,
                rest + range
            );
        }
    }

    #[test]
    fn controllers_on_one_body_draw_decorrelated_resets() {
        let (mock, backend) = shared(two_joint_backend());
        let factory = DeterministRandomVariableFactory::new(11);
        let config = JointControllerConfig {
            reset_range: Some(vec![1.0, 1.0]),
            ..Default::default()
        };
        let mut first =
            JointController::from_config(&config, backend.clone(), 0, &factory).unwrap();
        let mut second = JointController::from_config(&config, backend, 0, &factory).unwrap();
        first.reset().unwrap();
        second.reset().unwrap();

        let mock = mock.read().unwrap();
        assert_eq!(mock.reset_calls.len(), 4);
        assert_ne!(mock.reset_calls[0].1, mock.reset_calls[2].1);
        assert_ne!(mock.reset_calls[1].1, mock.reset_calls[3].1);
    }

    #[test]
    fn filtered_joints_are_never_touched() {
        let mock = MockBackend::with_limits(&[(-1., 1., 10., 2.); 3]);
        let (mock, backend) = shared(mock);
        let config = JointControllerConfig {
            joints: Some(vec!["joint_0".to_string(), "joint_2".to_string()]),
            reset_range: Some(vec![0.5, 0.5]),
            ..Default::default()
        };
        let mut controller = JointController::from_config(
            &config,
            backend,
            0,
            &DeterministRandomVariableFactory::default(),
        )
        .unwrap();
        controller.reset().unwrap();
        controller.update(&[1., 1.]).unwrap();

        let mock = mock.read().unwrap();
        assert!(mock.reset_calls.iter().all(|&(joint, _)| joint != 1));
        assert!(mock.last_batch().joint_ids.iter().all(|&joint| joint != 1));
        assert!(mock.position_reads.lock().unwrap().is_empty());
    }
}
