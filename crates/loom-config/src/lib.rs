//! loom configuration system.
//!
//! TOML-based configuration with validation and all-or-nothing runtime
//! updates of generation settings. All config sections use sensible
//! defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use loom_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod toml_writer;
pub mod update;
pub mod validation;

pub use schema::{
    ContextConfig, EngineConfig, LogLevel, LoggingConfig, LoomConfig, ModelConfig, StorageConfig,
    CONFIG_SCHEMA_VERSION,
};
pub use toml_writer::{save_config, save_config_to_path};
pub use update::{ModelConfigChange, ModelConfigUpdate};

use loom_common::ConfigError;
use std::path::Path;

/// Load config from the platform default path and validate it.
///
/// Creates a commented default file on first run.
pub fn load_config() -> Result<LoomConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load config from an explicit path and validate it.
pub fn load_config_from(path: &Path) -> Result<LoomConfig, ConfigError> {
    let config = toml_loader::load_from_path(path)?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &LoomConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let json = config_to_json(&LoomConfig::default());
        assert!(json.contains("\"model\""));
        assert!(json.contains("\"context\""));
        assert!(json.contains("\"storage\""));
        assert!(json.contains("\"engine\""));
        assert!(json.contains("\"logging\""));
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn load_config_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[model]\ntop_p = 3.0\n").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "model.top_p");
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = LoomConfig::default();
        let parsed: LoomConfig = serde_json::from_str(&config_to_json(&config)).unwrap();
        assert_eq!(parsed, config);
    }
}
