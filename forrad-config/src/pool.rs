//! Object pool sizing.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::validation;

/// Parameters every pool of a node is created with.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validate_pool))]
pub struct PoolConfig {
    /// Object alignment in bytes (power of two).
    #[serde(default = "default_alignment")]
    #[validate(range(min = 1, max = 4096))]
    pub alignment: usize,

    /// Objects per chunk; the default chunk size is `object_size * chunk_object_count`.
    #[serde(default = "default_chunk_object_count")]
    #[validate(range(min = 1, max = 1048576))]
    pub chunk_object_count: usize,

    /// Object size (bytes) for pools created from configuration alone.
    #[serde(default = "default_object_size")]
    #[validate(range(min = 1, max = 1048576))]
    pub object_size: usize,
}

fn default_alignment() -> usize {
    64
}

fn default_chunk_object_count() -> usize {
    1024
}

fn default_object_size() -> usize {
    64
}

fn validate_pool(config: &PoolConfig) -> Result<(), ValidationError> {
    validation::validate_power_of_two(config.alignment)
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            alignment: default_alignment(),
            chunk_object_count: default_chunk_object_count(),
            object_size: default_object_size(),
        }
    }
}
