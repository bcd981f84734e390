//! Simulator configuration.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validate_simulator))]
pub struct SimulatorConfig {
    /// Seed for deterministic simulation.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of cooperative tasks sharing the pool.
    #[serde(default = "default_task_count")]
    #[validate(range(min = 1, max = 65536))]
    pub task_count: usize,

    /// Steps each task performs.
    #[serde(default = "default_ops_per_task")]
    pub ops_per_task: usize,

    /// Objects a task may hold at once.
    #[serde(default = "default_max_held")]
    #[validate(range(min = 1))]
    pub max_held: usize,

    /// Probability that an allocation runs inside a no-switch region.
    #[serde(default)]
    pub no_switch_probability: f64,

    /// Probability that a step is a plain yield.
    #[serde(default = "default_yield_probability")]
    pub yield_probability: f64,
}

fn default_seed() -> u64 {
    42
}

fn default_task_count() -> usize {
    16
}

fn default_ops_per_task() -> usize {
    1000
}

fn default_max_held() -> usize {
    8
}

fn default_yield_probability() -> f64 {
    0.1
}

fn validate_simulator(config: &SimulatorConfig) -> Result<(), ValidationError> {
    validation::validate_fraction(config.no_switch_probability)?;
    validation::validate_fraction(config.yield_probability)
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            task_count: default_task_count(),
            ops_per_task: default_ops_per_task(),
            max_held: default_max_held(),
            no_switch_probability: 0.0,
            yield_probability: default_yield_probability(),
        }
    }
}
