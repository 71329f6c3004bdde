/*!
Provides the [`AddonManager`], which owns the addons of one robot and
dispatches `reset`, `update` and `observe` calls to them.

The manager is built from an [`AddonManagerConfig`], loaded from a yaml
file through `confy` or parsed from a string. Addons are selected by
their tagged configuration; there is no dynamic plugin discovery.
*/

use std::path::Path;

use log::{debug, info};
use serde_derive::{Deserialize, Serialize};

use crate::backend::{BodyId, SharedBackend};
use crate::errors::{RobokitError, RobokitErrorTypes, RobokitResult};
use crate::utils::determinist_random_variable::DeterministRandomVariableFactory;

use super::joint_controller::JointControllerConfig;
use super::{make_addon, ActionSpace, Addon, AddonConfig, AddonObservation};

/// One named addon of the manager.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ManagedAddonConfig {
    pub name: String,
    pub config: AddonConfig,
}

impl Default for ManagedAddonConfig {
    fn default() -> Self {
        Self {
            name: "some_addon".to_string(),
            config: AddonConfig::JointController(Box::new(JointControllerConfig::default())),
        }
    }
}

/// Configuration of the [`AddonManager`].
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
#[serde(deny_unknown_fields)]
pub struct AddonManagerConfig {
    /// Global seed of the deterministic random variables.
    pub seed: u64,
    pub addons: Vec<ManagedAddonConfig>,
}

impl Default for AddonManagerConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            addons: Vec::new(),
        }
    }
}

/// Owns the addons of one robot.
#[derive(Debug)]
pub struct AddonManager {
    addons: Vec<(String, Box<dyn Addon>)>,
}

impl AddonManager {
    /// Makes a new [`AddonManager`] from the given config, building
    /// every configured addon on `body`.
    pub fn from_config(
        config: &AddonManagerConfig,
        backend: SharedBackend,
        body: BodyId,
    ) -> RobokitResult<Self> {
        let va_factory = DeterministRandomVariableFactory::new(config.seed);
        let mut addons = Vec::with_capacity(config.addons.len());
        for managed in &config.addons {
            let addon = make_addon(&managed.config, backend.clone(), body, &va_factory)
                .map_err(|e| e.chain(format!("while building addon `{}`", managed.name)))?;
            debug!("Addon `{}` built on body {}", managed.name, body);
            addons.push((managed.name.clone(), addon));
        }
        info!("AddonManager ready with {} addons", addons.len());
        Ok(Self { addons })
    }

    /// Makes a new [`AddonManager`] from a yaml configuration file.
    pub fn from_config_path(
        config_path: &Path,
        backend: SharedBackend,
        body: BodyId,
    ) -> RobokitResult<Self> {
        let config: AddonManagerConfig = confy::load_path(config_path).map_err(|e| {
            RobokitError::new(
                RobokitErrorTypes::ConfigError,
                format!("cannot load `{}`: {}", config_path.display(), e),
            )
        })?;
        Self::from_config(&config, backend, body)
    }

    /// Makes a new [`AddonManager`] from a yaml configuration string.
    pub fn from_yaml_str(yaml: &str, backend: SharedBackend, body: BodyId) -> RobokitResult<Self> {
        let config: AddonManagerConfig = serde_yaml::from_str(yaml).map_err(|e| {
            RobokitError::new(
                RobokitErrorTypes::ConfigError,
                format!("invalid addon configuration: {}", e),
            )
        })?;
        Self::from_config(&config, backend, body)
    }

    /// Reset every addon, in configuration order.
    pub fn reset(&mut self) -> RobokitResult<()> {
        for (name, addon) in &mut self.addons {
            addon
                .reset()
                .map_err(|e| e.chain(format!("while resetting addon `{}`", name)))?;
        }
        Ok(())
    }

    /// Apply one control step to the named addon.
    pub fn update(&mut self, name: &str, action: &[f32]) -> RobokitResult<()> {
        let (_, addon) = self
            .addons
            .iter_mut()
            .find(|(addon_name, _)| addon_name == name)
            .ok_or_else(|| {
                RobokitError::new(
                    RobokitErrorTypes::ConfigError,
                    format!("no addon named `{}`", name),
                )
            })?;
        addon.update(action)
    }

    /// Collect the observations of every sensor addon.
    pub fn observe(&mut self) -> RobokitResult<Vec<(String, AddonObservation)>> {
        let mut observations = Vec::new();
        for (name, addon) in &mut self.addons {
            if let Some(observation) = addon
                .observe()
                .map_err(|e| e.chain(format!("while observing addon `{}`", name)))?
            {
                observations.push((name.clone(), observation));
            }
        }
        Ok(observations)
    }

    /// Action bounds of the named addon, if it consumes actions.
    pub fn action_space(&self, name: &str) -> Option<&ActionSpace> {
        self.addons
            .iter()
            .find(|(addon_name, _)| addon_name == name)
            .and_then(|(_, addon)| addon.action_space())
    }

    pub fn len(&self) -> usize {
        self.addons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addons.is_empty()
    }
}
