//! Where saved conversations live.

use std::path::PathBuf;

use loom_common::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON document per chat. Defaults to the
    /// platform data directory (`~/.local/share/loom/chats` on Linux).
    pub chats_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the chats directory, falling back to the platform default.
    pub fn resolve_chats_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.chats_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_chats_dir(),
        }
    }
}

/// Platform data directory for saved chats.
pub fn default_chats_dir() -> Result<PathBuf, ConfigError> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::ParseError("could not determine data directory".into()))?;
    Ok(data_dir.join("loom").join("chats"))
}
