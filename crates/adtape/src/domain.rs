//! Argument validation for elementary functions.
//!
//! Checks run on forward values at node construction, so invalid inputs are
//! reported where they happen instead of surfacing as NaN gradients later.

use crate::error::AdError;

/// Require `x > 0`.
pub fn check_positive(function: &'static str, name: &str, x: f64) -> Result<(), AdError> {
    if x > 0.0 {
        Ok(())
    } else {
        Err(AdError::domain(
            function,
            format!("{name} is {x}, but must be positive"),
        ))
    }
}

/// Require `x >= 0`.
pub fn check_nonnegative(function: &'static str, name: &str, x: f64) -> Result<(), AdError> {
    if x >= 0.0 {
        Ok(())
    } else {
        Err(AdError::domain(
            function,
            format!("{name} is {x}, but must be nonnegative"),
        ))
    }
}

/// Require `x` to be finite.
pub fn check_finite(function: &'static str, name: &str, x: f64) -> Result<(), AdError> {
    if x.is_finite() {
        Ok(())
    } else {
        Err(AdError::domain(
            function,
            format!("{name} is {x}, but must be finite"),
        ))
    }
}

/// Require `x` not to be NaN.
pub fn check_not_nan(function: &'static str, name: &str, x: f64) -> Result<(), AdError> {
    if x.is_nan() {
        Err(AdError::domain(function, format!("{name} is NaN")))
    } else {
        Ok(())
    }
}

/// Require two containers to have the same length.
pub fn check_same_len(expected: usize, actual: usize) -> Result<(), AdError> {
    if expected == actual {
        Ok(())
    } else {
        Err(AdError::ShapeMismatch { expected, actual })
    }
}
