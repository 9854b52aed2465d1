//! Validation for generation settings.

use crate::schema::ModelConfig;
use loom_common::{ConfigError, FieldError};

use super::helpers::{validate_not_blank, validate_range, validate_range_f64};

pub(crate) fn check_model(errors: &mut Vec<FieldError>, model: &ModelConfig) {
    validate_not_blank(errors, "model.model_name", &model.model_name);
    validate_range(
        errors,
        "model.generation_length",
        model.generation_length,
        1,
        4096,
    );
    validate_range(errors, "model.chunk_size", model.chunk_size, 1, 512);
    validate_range_f64(errors, "model.temperature", model.temperature, 0.0, 2.0);
    validate_range_f64(errors, "model.top_p", model.top_p, 0.0, 1.0);
    validate_range(
        errors,
        "model.max_context_length",
        model.max_context_length,
        256,
        1_048_576,
    );
}

/// Validate the model section on its own, e.g. before a runtime update.
pub fn validate_model(model: &ModelConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();
    check_model(&mut errors, model);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors))
    }
}
