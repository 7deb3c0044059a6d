//! Floating-point comparison helpers for durations in seconds.

use crate::error::{CadenceError, CadenceResult};

/// Absolute tolerance used for every duration comparison unless overridden.
pub const DEFAULT_TOLERANCE: f64 = 0.001;

/// True when `a` and `b` differ by at most `tolerance`.
#[inline]
pub fn within(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

/// Reject non-finite or non-positive values with an `InvalidArgument`.
pub fn ensure_positive(name: &str, value: f64) -> CadenceResult<f64> {
    if !value.is_finite() {
        return Err(CadenceError::invalid_argument(format!(
            "{name} must be finite, got {value}"
        )));
    }
    if value <= 0.0 {
        return Err(CadenceError::invalid_argument(format!(
            "{name} must be greater than zero, got {value}"
        )));
    }
    Ok(value)
}

/// Reject non-finite or negative values with an `InvalidArgument`.
pub fn ensure_non_negative(name: &str, value: f64) -> CadenceResult<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(CadenceError::invalid_argument(format!(
            "{name} must be a finite non-negative number, got {value}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_is_inclusive() {
        assert!(within(1.0, 1.001, DEFAULT_TOLERANCE + 1e-12));
        assert!(!within(1.0, 1.002, DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_ensure_positive_rejects_nan_and_zero() {
        assert!(ensure_positive("total", f64::NAN).is_err());
        assert!(ensure_positive("total", f64::INFINITY).is_err());
        assert!(ensure_positive("total", 0.0).is_err());
        assert!(ensure_positive("total", -3.0).is_err());
        assert_eq!(ensure_positive("total", 2.5).unwrap(), 2.5);
    }

    #[test]
    fn test_ensure_non_negative_allows_zero() {
        assert_eq!(ensure_non_negative("margin", 0.0).unwrap(), 0.0);
        assert!(ensure_non_negative("margin", -0.1).is_err());
    }
}
