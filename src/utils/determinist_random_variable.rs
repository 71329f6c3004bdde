/*!
# Determinist Random Variable

Random variables with a deterministic behavior, for reproducible runs.

The [`DeterministRandomVariableFactory`] is created with a global seed;
each variable derives its own ChaCha8 stream from the global seed plus a
per-variable seed, so two runs with the same seeds draw the same series
of numbers while two variables of the same run stay decorrelated.

Available types:
- Fixed: always return the same value
- Uniform: uniform distribution between a min and a max
- Normal: normal distribution
 */

use std::sync::atomic::{AtomicU64, Ordering};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

/// Factory creating random variables seeded from a global run seed.
pub struct DeterministRandomVariableFactory {
    /// Global run seed.
    pub global_seed: u64,
    /// Next per-variable seed handed out by
    /// [`next_unique_seed`](Self::next_unique_seed).
    seed_sequence: AtomicU64,
}

impl DeterministRandomVariableFactory {
    /// Create a new factory with the given `global_seed`.
    pub fn new(global_seed: u64) -> Self {
        Self {
            global_seed,
            seed_sequence: AtomicU64::new(0),
        }
    }

    /// Hand out the next per-variable seed. Consumers built from the
    /// same factory in the same order get the same seeds from one run
    /// to the next, while two consumers of one run never share a
    /// stream.
    pub fn next_unique_seed(&self) -> u64 {
        self.seed_sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Create a new random variable with the given configuration.
    pub fn make_variable(
        &self,
        config: RandomVariableTypeConfig,
    ) -> Box<dyn DeterministRandomVariable> {
        match config {
            RandomVariableTypeConfig::None => {
                Box::new(DeterministFixedRandomVariable::from_config(
                    self.global_seed,
                    FixedRandomVariableConfig::default(),
                ))
            }
            RandomVariableTypeConfig::Fixed(c) => Box::new(
                DeterministFixedRandomVariable::from_config(self.global_seed, c),
            ),
            RandomVariableTypeConfig::Uniform(c) => Box::new(
                DeterministUniformRandomVariable::from_config(self.global_seed, c),
            ),
            RandomVariableTypeConfig::Normal(c) => Box::new(
                DeterministNormalRandomVariable::from_config(self.global_seed, c),
            ),
        }
    }

    /// Uniform variable over [0, 1), the common case for reset
    /// randomization.
    pub fn make_unit_uniform(&self, unique_seed: u64) -> Box<dyn DeterministRandomVariable> {
        self.make_variable(RandomVariableTypeConfig::Uniform(
            UniformRandomVariableConfig {
                unique_seed,
                min: 0.,
                max: 1.,
            },
        ))
    }
}

impl Default for DeterministRandomVariableFactory {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Trait for a random variable with a deterministic behavior.
///
/// Each variable owns its stream: successive calls to `gen` advance it.
pub trait DeterministRandomVariable:
    std::fmt::Debug + std::marker::Send + std::marker::Sync
{
    fn gen(&mut self) -> f32;
}

/// Configuration of the random variable: fixed, uniform or normal.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum RandomVariableTypeConfig {
    /// No random variable
    None,
    /// Fixed value
    Fixed(FixedRandomVariableConfig),
    /// Uniform distribution
    Uniform(UniformRandomVariableConfig),
    /// Normal distribution
    Normal(NormalRandomVariableConfig),
}

impl Default for RandomVariableTypeConfig {
    fn default() -> Self {
        RandomVariableTypeConfig::None
    }
}

/*******************************************************************
 * Fixed
*******************************************************************/

/// Configuration for a fixed random variable.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FixedRandomVariableConfig {
    /// Fixed value to return.
    pub value: f32,
}

impl Default for FixedRandomVariableConfig {
    fn default() -> Self {
        Self { value: 0. }
    }
}

/// Random variable which always return the same value.
#[derive(Debug)]
pub struct DeterministFixedRandomVariable {
    value: f32,
}

impl DeterministFixedRandomVariable {
    pub fn from_config(_global_seed: u64, config: FixedRandomVariableConfig) -> Self {
        Self {
            value: config.value,
        }
    }
}

impl DeterministRandomVariable for DeterministFixedRandomVariable {
    fn gen(&mut self) -> f32 {
        self.value
    }
}

/*******************************************************************
 * Uniform
 *******************************************************************/

/// Configuration for a uniform random variable.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct UniformRandomVariableConfig {
    /// Random seed for this random variable.
    pub unique_seed: u64,
    /// Minimum value of the uniform distribution.
    pub min: f32,
    /// Maximum value of the uniform distribution.
    pub max: f32,
}

impl Default for UniformRandomVariableConfig {
    fn default() -> Self {
        Self {
            unique_seed: 0,
            min: -1.,
            max: 1.,
        }
    }
}

/// Random variable with a uniform distribution between a min and a max.
#[derive(Debug)]
pub struct DeterministUniformRandomVariable {
    rng: ChaCha8Rng,
    /// Minimum value of the uniform distribution.
    min: f32,
    /// Maximum value of the uniform distribution.
    max: f32,
}

impl DeterministUniformRandomVariable {
    pub fn from_config(global_seed: u64, config: UniformRandomVariableConfig) -> Self {
        assert!(config.min <= config.max);
        Self {
            rng: ChaCha8Rng::seed_from_u64(global_seed.wrapping_add(config.unique_seed)),
            min: config.min,
            max: config.max,
        }
    }
}

impl DeterministRandomVariable for DeterministUniformRandomVariable {
    fn gen(&mut self) -> f32 {
        self.min + self.rng.gen::<f32>() * (self.max - self.min)
    }
}

/*******************************************************************
 * Normal
 *******************************************************************/

/// Configuration for a normal random variable.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct NormalRandomVariableConfig {
    /// Random seed for this random variable.
    pub unique_seed: u64,
    /// Mean of the normal distribution.
    pub mean: f32,
    /// Variance of the normal distribution.
    pub variance: f32,
}

impl Default for NormalRandomVariableConfig {
    fn default() -> Self {
        Self {
            unique_seed: 0,
            mean: 0.,
            variance: 1.,
        }
    }
}

/// Random variable following a normal distribution.
#[derive(Debug)]
pub struct DeterministNormalRandomVariable {
    rng: ChaCha8Rng,
    /// Normal distribution.
    nd: Normal,
}

impl DeterministNormalRandomVariable {
    pub fn from_config(global_seed: u64, config: NormalRandomVariableConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(global_seed.wrapping_add(config.unique_seed)),
            nd: Normal::new(config.mean.into(), config.variance.sqrt().into())
                .expect("Impossible to create the normal distribution"),
        }
    }
}

impl DeterministRandomVariable for DeterministNormalRandomVariable {
    fn gen(&mut self) -> f32 {
        self.nd.sample(&mut self.rng) as f32
    }
}
