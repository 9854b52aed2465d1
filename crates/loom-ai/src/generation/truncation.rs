//! Context truncation policy.
//!
//! When a conversation no longer fits the engine's context window, the
//! middle of the path is dropped: the earliest turns (system instructions,
//! opening request) and the most recent turns survive. Mid-conversation
//! context is lost silently; callers that care should keep histories short
//! or raise the window.

use loom_config::ContextConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationPolicy {
    pub keep_prefix: usize,
    pub keep_suffix: usize,
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

impl From<&ContextConfig> for TruncationPolicy {
    fn from(config: &ContextConfig) -> Self {
        Self {
            keep_prefix: config.keep_prefix as usize,
            keep_suffix: config.keep_suffix as usize,
        }
    }
}

impl TruncationPolicy {
    /// Keep the first `keep_prefix` and last `keep_suffix` turns. The last
    /// turn is always kept. Nothing is dropped when the two windows overlap.
    pub fn apply<T: Clone>(&self, turns: &[T]) -> Vec<T> {
        let suffix = self.keep_suffix.max(1);
        if self.keep_prefix + suffix >= turns.len() {
            return turns.to_vec();
        }
        let mut kept = Vec::with_capacity(self.keep_prefix + suffix);
        kept.extend_from_slice(&turns[..self.keep_prefix]);
        kept.extend_from_slice(&turns[turns.len() - suffix..]);
        kept
    }

    /// Number of turns `apply` would drop.
    pub fn dropped(&self, len: usize) -> usize {
        len.saturating_sub(self.keep_prefix + self.keep_suffix.max(1))
    }
}
