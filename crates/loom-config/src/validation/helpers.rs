//! Shared range-validation helpers used by all section validators.

use loom_common::FieldError;

/// Push an error if `value` is outside `[min, max]` (integer).
pub(crate) fn validate_range(
    errors: &mut Vec<FieldError>,
    name: &str,
    value: u32,
    min: u32,
    max: u32,
) {
    if value < min || value > max {
        errors.push(FieldError::new(
            name,
            format!("{value} is out of range [{min}, {max}]"),
        ));
    }
}

/// Push an error if `value` is outside `[min, max]` (float). NaN is rejected.
pub(crate) fn validate_range_f64(
    errors: &mut Vec<FieldError>,
    name: &str,
    value: f64,
    min: f64,
    max: f64,
) {
    if value.is_nan() || value < min || value > max {
        errors.push(FieldError::new(
            name,
            format!("{value} is out of range [{min}, {max}]"),
        ));
    }
}

/// Push an error if `value` is empty or only whitespace.
pub(crate) fn validate_not_blank(errors: &mut Vec<FieldError>, name: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(name, "must not be empty"));
    }
}
