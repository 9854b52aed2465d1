//! Generation model settings.

use serde::{Deserialize, Serialize};

/// Which model to run and how to sample from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub model_name: String,
    /// Total new-token budget per reply (valid range: 1-4096).
    pub generation_length: u32,
    /// Tokens requested per engine call (valid range: 1-512).
    pub chunk_size: u32,
    /// Sampling temperature (valid range: 0.0-2.0).
    pub temperature: f64,
    /// Nucleus sampling threshold (valid range: 0.0-1.0).
    pub top_p: f64,
    /// Upper bound on prompt tokens sent to the engine (valid range: 256-1048576).
    pub max_context_length: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_name: "meta-llama/Llama-3.1-8B-Instruct".into(),
            generation_length: 512,
            chunk_size: 20,
            temperature: 0.7,
            top_p: 0.9,
            max_context_length: 8192,
        }
    }
}
