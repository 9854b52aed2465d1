//! Full configuration validation.
//!
//! Each section has its own check; this orchestrator calls them all and
//! collects every failing field into a single `ConfigError`.

mod helpers;
mod misc;
mod model;


pub use model::validate_model;

use crate::schema::LoomConfig;
use loom_common::{ConfigError, FieldError};

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &LoomConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<FieldError> = Vec::new();

    model::check_model(&mut errors, &config.model);
    misc::check_context(&mut errors, config);
    misc::check_engine(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors))
    }
}
