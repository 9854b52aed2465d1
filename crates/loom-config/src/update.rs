//! Runtime updates of generation settings.
//!
//! An update is merged into a copy of the live settings, the copy is
//! validated as a whole, and only then swapped in. A rejected update leaves
//! the live settings untouched.

use loom_common::ConfigError;
use serde::{Deserialize, Serialize};

use crate::schema::ModelConfig;
use crate::validation::validate_model;

/// Partial model settings as submitted by a settings form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfigUpdate {
    pub model_name: Option<String>,
    pub generation_length: Option<u32>,
    pub chunk_size: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_context_length: Option<u32>,
}

/// What an accepted update changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelConfigChange {
    /// Any field differs from the previous settings.
    pub changed: bool,
    /// The model itself changed and the engine must be reloaded.
    pub reload_required: bool,
}

impl ModelConfig {
    /// Settings with every field present in `update` replaced.
    pub fn merged(&self, update: &ModelConfigUpdate) -> ModelConfig {
        ModelConfig {
            model_name: update
                .model_name
                .clone()
                .unwrap_or_else(|| self.model_name.clone()),
            generation_length: update.generation_length.unwrap_or(self.generation_length),
            chunk_size: update.chunk_size.unwrap_or(self.chunk_size),
            temperature: update.temperature.unwrap_or(self.temperature),
            top_p: update.top_p.unwrap_or(self.top_p),
            max_context_length: update
                .max_context_length
                .unwrap_or(self.max_context_length),
        }
    }

    /// Validate and apply `update` all-or-nothing.
    pub fn apply_update(
        &mut self,
        update: &ModelConfigUpdate,
    ) -> Result<ModelConfigChange, ConfigError> {
        let candidate = self.merged(update);
        validate_model(&candidate)?;

        let change = ModelConfigChange {
            changed: candidate != *self,
            reload_required: candidate.model_name != self.model_name,
        };
        *self = candidate;
        Ok(change)
    }
}
