//! Configuration schema types for loom.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod context;
mod engine;
mod logging;
mod model;
mod storage;

pub use context::*;
pub use engine::*;
pub use logging::*;
pub use model::*;
pub use storage::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for loom.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LoomConfig {
    pub model: ModelConfig,
    pub context: ContextConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}
