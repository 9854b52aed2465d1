//! Validation for the context and engine sections.

use crate::schema::LoomConfig;
use loom_common::{FieldError, Role};

use super::helpers::{validate_not_blank, validate_range};

pub(crate) fn check_context(errors: &mut Vec<FieldError>, config: &LoomConfig) {
    if config.context.root_role == Role::Assistant {
        errors.push(FieldError::new(
            "context.root_role",
            "must be \"system\" or \"user\"",
        ));
    }
    validate_range(
        errors,
        "context.keep_prefix",
        config.context.keep_prefix,
        0,
        1024,
    );
    // The suffix always holds the turn being generated.
    validate_range(
        errors,
        "context.keep_suffix",
        config.context.keep_suffix,
        1,
        1024,
    );
}

pub(crate) fn check_engine(errors: &mut Vec<FieldError>, config: &LoomConfig) {
    validate_not_blank(errors, "engine.base_url", &config.engine.base_url);
    validate_range(
        errors,
        "engine.timeout_secs",
        config.engine.timeout_secs,
        1,
        3600,
    );
}
