//! Custom validation functions for configuration.

use validator::ValidationError;

/// Validate that the provided value is a power of two.
pub fn validate_power_of_two(value: usize) -> Result<(), ValidationError> {
    if value.is_power_of_two() {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_power_of_two"))
    }
}

/// Validate that a fraction lies in `0.0..=1.0` (rejects NaN).
pub fn validate_fraction(value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_fraction"))
    }
}

/// Validate a tracing level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"]
        .contains(&level.to_ascii_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_of_two() {
        assert!(validate_power_of_two(64).is_ok());
        assert!(validate_power_of_two(1).is_ok());
        assert!(validate_power_of_two(0).is_err());
        assert!(validate_power_of_two(48).is_err());
    }

    #[test]
    fn test_fraction() {
        assert!(validate_fraction(0.0).is_ok());
        assert!(validate_fraction(1.0).is_ok());
        assert!(validate_fraction(1.5).is_err());
        assert!(validate_fraction(f64::NAN).is_err());
    }

    #[test]
    fn test_log_level() {
        assert!(validate_log_level("INFO").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }
}
