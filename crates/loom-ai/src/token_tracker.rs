//! Token usage tracking across the generations of a session.

use std::collections::HashMap;

use crate::TokenUsage;

/// Tracks cumulative token usage overall and per chat.
pub struct TokenTracker {
    /// Total usage across all chats.
    total: TokenUsage,
    /// Usage broken down by chat id.
    by_chat: HashMap<String, TokenUsage>,
    /// Number of generations recorded.
    generation_count: u64,
}

impl TokenTracker {
    pub fn new() -> Self {
        Self {
            total: TokenUsage::default(),
            by_chat: HashMap::new(),
            generation_count: 0,
        }
    }

    /// Record token usage from one generation.
    pub fn record(&mut self, chat_id: &str, usage: &TokenUsage) {
        self.total.prompt_tokens += usage.prompt_tokens;
        self.total.generated_tokens += usage.generated_tokens;
        self.generation_count += 1;

        let entry = self.by_chat.entry(chat_id.to_string()).or_default();
        entry.prompt_tokens += usage.prompt_tokens;
        entry.generated_tokens += usage.generated_tokens;
    }

    pub fn total(&self) -> &TokenUsage {
        &self.total
    }

    pub fn for_chat(&self, chat_id: &str) -> Option<&TokenUsage> {
        self.by_chat.get(chat_id)
    }

    pub fn total_tokens(&self) -> u64 {
        self.total.total_tokens()
    }

    pub fn generation_count(&self) -> u64 {
        self.generation_count
    }

    pub fn reset(&mut self) {
        self.total = TokenUsage::default();
        self.by_chat.clear();
        self.generation_count = 0;
    }
}

impl Default for TokenTracker {
    fn default() -> Self {
        Self::new()
    }
}
