/*!
Provides the [`JointGainController`], a joint motor controller with a
distance-adaptive position gain.

The action vector carries one extra trailing element, the gain selector
in [-1, 1]:
- selector <= 0: automatic mode, the position gain is scaled by the
  inverse of the normalized distance to the target, so the servo gets
  tighter as the joint approaches its goal;
- selector > 0: agent-controlled mode, the agent scales the automatic
  law by the selector value.

In both modes the velocity gain becomes `base + pGain^2` to keep it
dominant over the position gain for the stability of the underlying
PD-style servo. This relationship holds by construction for
`pGain < 1` and is not enforced as a hard invariant.
*/

use log::debug;
use serde_derive::{Deserialize, Serialize};

extern crate nalgebra as na;
use na::SVector;

use crate::backend::{BodyId, ControlMode, JointId, MotorBatch, SharedBackend};
use crate::errors::{RobokitError, RobokitErrorTypes, RobokitResult};
use crate::utils::determinist_random_variable::{
    DeterministRandomVariable, DeterministRandomVariableFactory,
};

use super::joint_controller::{reset_joint_states, resolve_joint_specs, JointSpec};
use super::{ActionSpace, Addon};

/// Epsilon of the adaptive gain law, bounding the gain at zero distance.
const GAIN_DISTANCE_EPSILON: f32 = 1e-2;

/// Lifetime of one debug trace segment, in seconds.
const TRACE_LIFETIME: f32 = 360.;

/// Configuration of the [`JointGainController`].
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
#[serde(deny_unknown_fields)]
pub struct JointGainControllerConfig {
    /// Low-level control mode: position, velocity or torque. The gain
    /// law only applies in position mode.
    pub control_mode: ControlMode,
    /// Base position gain of the motor servo.
    pub position_gain: f32,
    /// Base velocity gain of the motor servo.
    pub velocity_gain: f32,
    /// The whole action vector is multiplied by this factor, and the
    /// action-space bounds divided by it.
    pub action_scaling: f32,
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
    /// Draw a colored trace of every link position at each step.
    pub debug: bool,
}

impl Default for JointGainControllerConfig {
    fn default() -> Self {
        Self {
            control_mode: ControlMode::Velocity,
            position_gain: 0.015,
            velocity_gain: 1.0,
            action_scaling: 1.0,
            joint: None,
            joints: None,
            rest_position: None,
            reset_range: None,
            debug: false,
        }
    }
}

/// Joint motor controller with a distance-adaptive position gain.
#[derive(Debug)]
pub struct JointGainController {
    backend: SharedBackend,
    body: BodyId,
    control_mode: ControlMode,
    position_gain: f32,
    velocity_gain: f32,
    scaling: f32,
    debug: bool,
    joints: Vec<JointSpec>,
    /// Per-joint motion range in action units, normalizing the distance
    /// of the gain law.
    joint_ranges: Vec<f32>,
    action_space: ActionSpace,
    reset_noise: Box<dyn DeterministRandomVariable>,
    /// Link positions sampled at the previous debug trace, if any.
    last_link_positions: Option<Vec<SVector<f32, 3>>>,
}

impl JointGainController {
    /// Makes a new [`JointGainController`] from the given config. The
    /// body and its joints must already exist in the backend.
    pub fn from_config(
        config: &JointGainControllerConfig,
        backend: SharedBackend,
        body: BodyId,
        va_factory: &DeterministRandomVariableFactory,
    ) -> RobokitResult<Self> {
        if config.action_scaling <= 0. {
            return Err(RobokitError::new(
                RobokitErrorTypes::ConfigError,
                format!("`action_scaling` must be positive, got {}", config.action_scaling),
            ));
        }
        let joints = resolve_joint_specs(
            &*backend.read().unwrap(),
            body,
            &config.joint,
            &config.joints,
            &config.rest_position,
            &config.reset_range,
        )?;
        debug!(
            "JointGainController on body {}: {} joints in {:?} mode, scaling {}",
            body,
            joints.len(),
            config.control_mode,
            config.action_scaling
        );

        let scaling = config.action_scaling;
        // The position bounds below are [-lower, upper], whose width
        // vanishes for symmetric limits. The gain law therefore keeps
        // its own per-joint ranges, the true [lower, upper] width.
        let joint_ranges: Vec<f32> = joints
            .iter()
            .map(|j| {
                ((j.upper_limit - j.lower_limit) / scaling)
                    .abs()
                    .max(GAIN_DISTANCE_EPSILON)
            })
            .collect();
        let action_space = match config.control_mode {
            ControlMode::Torque => ActionSpace::new(
                joints.iter().map(|j| -j.max_force / scaling).collect(),
                joints.iter().map(|j| j.max_force / scaling).collect(),
            ),
            ControlMode::Velocity => ActionSpace::new(
                joints.iter().map(|j| -j.max_velocity / scaling).collect(),
                joints.iter().map(|j| j.max_velocity / scaling).collect(),
            ),
            ControlMode::Position => {
                // trailing dimension: the gain selector, always [-1, 1]
                let mut low: Vec<f32> = joints.iter().map(|j| -j.lower_limit / scaling).collect();
                let mut high: Vec<f32> = joints.iter().map(|j| j.upper_limit / scaling).collect();
                low.push(-1.);
                high.push(1.);
                ActionSpace::new(low, high)
            }
        };

        Ok(Self {
            backend,
            body,
            control_mode: config.control_mode,
            position_gain: config.position_gain,
            velocity_gain: config.velocity_gain,
            scaling,
            debug: config.debug,
            joints,
            joint_ranges,
            action_space,
            reset_noise: va_factory.make_unit_uniform(va_factory.next_unique_seed()),
            last_link_positions: None,
        })
    }

    pub fn joints(&self) -> &[JointSpec] {
        &self.joints
    }

    /// Expected raw action length: one target per joint plus the
    /// trailing gain selector.
    fn expected_len(&self) -> usize {
        self.joints.len() + 1
    }

    /// Adaptive gain law: per-joint position gains from the normalized
    /// distance to the target, then `vGain = base + pGain^2`.
    fn adaptive_gains(&self, targets: &[f32], positions: &[f32], selector: f32) -> (Vec<f32>, Vec<f32>) {
        let base = if selector <= 0. {
            self.position_gain
        } else {
            self.position_gain * selector
        };
        let mut position_gains = Vec::with_capacity(targets.len());
        let mut velocity_gains = Vec::with_capacity(targets.len());
        for (dim, (&target, &position)) in targets.iter().zip(positions.iter()).enumerate() {
            let dist = (target - position).abs() / self.joint_ranges[dim];
            let p_gain = base / (dist + GAIN_DISTANCE_EPSILON);
            position_gains.push(p_gain);
            velocity_gains.push(self.velocity_gain + p_gain * p_gain);
        }
        (position_gains, velocity_gains)
    }

    /// Sample every link of the body and draw one colored segment per
    /// link from its previous position. Visualization only.
    fn draw_trace(&mut self) {
        let mut backend = self.backend.write().unwrap();
        let n = backend.num_joints(self.body);
        let current: Vec<SVector<f32, 3>> = (0..n)
            .map(|link| backend.link_world_position(self.body, link))
            .collect();
        if let Some(last) = &self.last_link_positions {
            for (i, (from, to)) in current.iter().zip(last.iter()).enumerate() {
                let color = [
                    (n - i) as f32 / (n + 1) as f32,
                    0.9,
                    i as f32 / (n + 1) as f32,
                ];
                backend.add_debug_line(*from, *to, color, 1., TRACE_LIFETIME);
            }
        }
        self.last_link_positions = Some(current);
    }
}

impl Addon for JointGainController {
    fn reset(&mut self) -> RobokitResult<()> {
        reset_joint_states(
            &self.backend,
            self.body,
            &self.joints,
            self.reset_noise.as_mut(),
        );
        if self.debug {
            self.backend.write().unwrap().clear_debug_items();
        }
        self.last_link_positions = None;
        Ok(())
    }

    fn update(&mut self, action: &[f32]) -> RobokitResult<()> {
        if action.len() != self.expected_len() {
            return Err(RobokitError::new(
                RobokitErrorTypes::InvalidActionShape,
                format!(
                    "expected {} actions (targets + gain selector), got {}",
                    self.expected_len(),
                    action.len()
                ),
            ));
        }

        if self.debug {
            self.draw_trace();
        }

        let scaled: Vec<f32> = action.iter().map(|a| a * self.scaling).collect();
        let (targets, selector) = scaled.split_at(scaled.len() - 1);
        let selector = selector[0];
        let n = targets.len();
        let joint_ids: Vec<JointId> = self.joints.iter().map(|j| j.joint_id).collect();
        let torque_limits: Vec<f32> = self.joints.iter().map(|j| j.max_force).collect();

        let batch = match self.control_mode {
            ControlMode::Position => {
                let positions: Vec<f32> = {
                    let backend = self.backend.read().unwrap();
                    joint_ids
                        .iter()
                        .map(|&joint| backend.joint_position(self.body, joint))
                        .collect()
                };
                let (position_gains, velocity_gains) =
                    self.adaptive_gains(targets, &positions, selector);
                MotorBatch {
                    mode: ControlMode::Position,
                    joint_ids,
                    target_positions: Some(targets.to_vec()),
                    target_velocities: Some(vec![0.; n]),
                    forces: torque_limits,
                    position_gains,
                    velocity_gains,
                }
            }
            // selector consumed but unused outside position mode
            ControlMode::Velocity => MotorBatch {
                mode: ControlMode::Velocity,
                joint_ids,
                target_positions: None,
                target_velocities: Some(targets.to_vec()),
                forces: torque_limits,
                position_gains: vec![self.position_gain; n],
                velocity_gains: vec![self.velocity_gain; n],
            },
            ControlMode::Torque => MotorBatch {
                mode: ControlMode::Torque,
                joint_ids,
                target_positions: None,
                target_velocities: None,
                forces: targets.to_vec(),
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
