//! Conversation context settings: root turn and truncation window.

use loom_common::Role;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an obedient assistant following user direction.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    /// Role of the root turn of every new conversation (`system` or `user`).
    pub root_role: Role,
    /// Content of the root turn.
    pub system_prompt: String,
    /// Earliest turns kept when the history overflows the context window.
    pub keep_prefix: u32,
    /// Most recent turns kept when the history overflows the context window.
    pub keep_suffix: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            root_role: Role::System,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            keep_prefix: 3,
            keep_suffix: 8,
        }
    }
}
