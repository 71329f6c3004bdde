/*!
This module provides the addon components which plug into a robot of the
simulation: [`JointController`](joint_controller::JointController),
[`JointGainController`](joint_gain_controller::JointGainController) and
[`Camera`](camera::Camera), all behind the [`Addon`] trait.

Addons are selected at construction time through the tagged
[`AddonConfig`] enumeration and built by [`make_addon`]; the
[`AddonManager`](addon_manager::AddonManager) owns the addons of one
robot.

## How to add a new addon ?

Implement the [`Addon`] trait, add a configuration variant to
[`AddonConfig`] and a construction arm to [`make_addon`].
*/

pub mod addon_manager;
pub mod camera;
pub mod joint_controller;
pub mod joint_gain_controller;

use serde_derive::{Deserialize, Serialize};

use crate::backend::{BodyId, SharedBackend};
use crate::errors::RobokitResult;
use crate::utils::determinist_random_variable::DeterministRandomVariableFactory;

use camera::{Camera, CameraConfig, CameraObservation};
use joint_controller::{JointController, JointControllerConfig};
use joint_gain_controller::{JointGainController, JointGainControllerConfig};

/// Per-dimension action bounds, derived once at addon construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpace {
    pub low: Vec<f32>,
    pub high: Vec<f32>,
}

impl ActionSpace {
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Self {
        assert_eq!(low.len(), high.len());
        Self { low, high }
    }

    /// Declared action dimensionality.
    pub fn len(&self) -> usize {
        self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.low.is_empty()
    }
}

/// Observation produced by a sensor addon.
#[derive(Debug, Clone)]
pub enum AddonObservation {
    Camera(CameraObservation),
}

/// Enumerates all the possible addon configurations.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub enum AddonConfig {
    JointController(Box<JointControllerConfig>),
    JointGainController(Box<JointGainControllerConfig>),
    Camera(Box<CameraConfig>),
}

/// Interface of every addon.
///
/// Controllers implement [`reset`](Addon::reset),
/// [`update`](Addon::update) and expose an
/// [`action_space`](Addon::action_space); sensors implement
/// [`observe`](Addon::observe). The driving loop calls `reset` once per
/// episode and `update`/`observe` once per simulation step, never
/// concurrently.
pub trait Addon: std::fmt::Debug + std::marker::Send + std::marker::Sync {
    /// Put the addon back to its episode start state. May write backend
    /// state directly.
    fn reset(&mut self) -> RobokitResult<()> {
        Ok(())
    }

    /// Apply one control step.
    fn update(&mut self, _action: &[f32]) -> RobokitResult<()> {
        Ok(())
    }

    /// Produce one observation, if this addon is a sensor.
    fn observe(&mut self) -> RobokitResult<Option<AddonObservation>> {
        Ok(None)
    }

    /// Action bounds, if this addon consumes actions.
    fn action_space(&self) -> Option<&ActionSpace> {
        None
    }
}

/// Build the addon selected by `config`, attached to `body` of the
/// given backend session.
pub fn make_addon(
    config: &AddonConfig,
    backend: SharedBackend,
    body: BodyId,
    va_factory: &DeterministRandomVariableFactory,
) -> RobokitResult<Box<dyn Addon>> {
    match config {
        AddonConfig::JointController(c) => Ok(Box::new(JointController::from_config(
            c, backend, body, va_factory,
        )?)),
        AddonConfig::JointGainController(c) => Ok(Box::new(JointGainController::from_config(
            c, backend, body, va_factory,
        )?)),
        AddonConfig::Camera(c) => Ok(Box::new(Camera::from_config(c, backend, body, va_factory)?)),
    }
}
