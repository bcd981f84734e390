//! Shared pool budget.
//!
//! The allocator only compares its byte counter against a maximum. How that
//! maximum relates to the node's shared memory region is decided here.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validate_quota))]
pub struct QuotaConfig {
    /// Maximum bytes the pools of one node may claim before backpressure.
    #[serde(default = "default_max_size")]
    pub shared_pool_max_size: u64,

    /// Fraction of the node's shared region the pools may claim.
    #[serde(default = "default_memory_fraction")]
    pub shared_pool_memory_fraction: f64,

    /// Size of the node's shared region, when known.
    #[serde(default)]
    pub locale_shared_size: Option<u64>,
}

fn default_max_size() -> u64 {
    1 << 30
}

fn default_memory_fraction() -> f64 {
    0.5
}

fn validate_quota(config: &QuotaConfig) -> Result<(), ValidationError> {
    validation::validate_fraction(config.shared_pool_memory_fraction)?;
    // a zero budget never lets a pool carve its first object
    if config.effective_max_bytes() == 0 {
        return Err(ValidationError::new("empty_budget"));
    }
    Ok(())
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            shared_pool_max_size: default_max_size(),
            shared_pool_memory_fraction: default_memory_fraction(),
            locale_shared_size: None,
        }
    }
}

impl QuotaConfig {
    /// Budget handed to the allocator domain: `shared_pool_max_size`, capped
    /// at the configured fraction of the shared region when its size is known.
    pub fn effective_max_bytes(&self) -> usize {
        let mut max = self.shared_pool_max_size;
        if let Some(region) = self.locale_shared_size {
            let share = (region as f64 * self.shared_pool_memory_fraction) as u64;
            max = max.min(share);
        }
        usize::try_from(max).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_max_without_region() {
        let quota = QuotaConfig {
            shared_pool_max_size: 4096,
            ..QuotaConfig::default()
        };
        assert_eq!(quota.effective_max_bytes(), 4096);
    }

    #[test]
    fn test_effective_max_capped_by_region() {
        let quota = QuotaConfig {
            shared_pool_max_size: 1 << 20,
            shared_pool_memory_fraction: 0.25,
            locale_shared_size: Some(1 << 16),
        };
        assert_eq!(quota.effective_max_bytes(), 1 << 14);

        let roomy = QuotaConfig {
            locale_shared_size: Some(1 << 40),
            ..quota
        };
        assert_eq!(roomy.effective_max_bytes(), 1 << 20);
    }

    #[test]
    fn test_rejects_bad_fraction() {
        let quota = QuotaConfig {
            shared_pool_memory_fraction: 1.5,
            ..QuotaConfig::default()
        };
        assert!(quota.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_budget() {
        let zero = QuotaConfig {
            shared_pool_max_size: 0,
            ..QuotaConfig::default()
        };
        assert!(zero.validate().is_err());

        let no_share = QuotaConfig {
            shared_pool_memory_fraction: 0.0,
            locale_shared_size: Some(1 << 20),
            ..QuotaConfig::default()
        };
        assert_eq!(no_share.effective_max_bytes(), 0);
        assert!(no_share.validate().is_err());
    }
}
