//! Conversation engine for loom.
//!
//! Provides the branching conversation core with:
//! - An arena-backed conversation tree with edit/regenerate branches
//! - Chunked streaming generation with context truncation and cancellation
//! - Chat sessions persisted as JSON documents in a directory
//! - A llama.cpp server adapter for the generation engine
//! - Token usage tracking

pub mod generation;
pub mod llama;
pub mod session;
pub mod token_tracker;
pub mod tree;

#[cfg(test)]
pub(crate) mod test_support;

use async_trait::async_trait;
use loom_common::{ConfigError, LoomError, StoreError};

pub use generation::{
    spawn_generation, Generation, GenerationHandle, GenerationParams, GenerationReport, StopReason,
    TruncationPolicy,
};
pub use llama::{LlamaServerConfig, LlamaServerEngine};
pub use loom_common::{HistoryEntry, Role};
pub use session::{
    ChatSession, ChatSessionManager, ChatStream, FileTreeStore, MemoryTreeStore, SessionRegistry,
    SharedSession, TreeStore,
};
pub use token_tracker::TokenTracker;
pub use tree::{ConversationTree, Direction, NodeId, Outcome, Rejection, SharedTree, TreeDocument};

/// Engine vocabulary id.
pub type Token = u32;

/// Narrow interface to a text-generation engine.
///
/// The engine owns tokenization and sampling; callers only decide what
/// context to send and how many tokens to ask for per call.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Produce up to `request.max_new_tokens` tokens following `context`.
    async fn generate_chunk(
        &self,
        context: &[Token],
        request: &ChunkRequest,
    ) -> Result<ChunkOutput, AiError>;

    async fn encode(&self, text: &str) -> Result<Vec<Token>, AiError>;

    async fn decode(&self, tokens: &[Token], skip_special: bool) -> Result<String, AiError>;

    /// Largest prompt, in tokens, the engine accepts.
    fn context_window(&self) -> usize;

    /// Render a message path as prompt text. The last message is left open
    /// so the engine continues it.
    fn format_prompt(&self, messages: &[Message]) -> String {
        let mut prompt = String::new();
        let last = messages.len().saturating_sub(1);
        for (i, message) in messages.iter().enumerate() {
            prompt.push_str("<|");
            prompt.push_str(message.role.as_str());
            prompt.push_str("|>\n");
            prompt.push_str(&message.content);
            if i != last {
                prompt.push_str("\n<|end|>\n");
            }
        }
        prompt
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Sampling parameters for one engine call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkRequest {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkOutput {
    /// Only the newly produced tokens.
    pub tokens: Vec<Token>,
    pub end_of_sequence: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub generated_tokens: u64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.generated_tokens)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Timeout")]
    Timeout,
    #[error("a generation is already running for this session")]
    Busy,
    #[error("invalid generation parameters: {0}")]
    InvalidParams(String),
    #[error("generation target is no longer part of the active conversation")]
    TargetMissing,
}

/// Failure of a session-level command.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),
}

impl ChatError {
    pub fn is_busy(&self) -> bool {
        matches!(self, ChatError::Ai(AiError::Busy))
    }
}

impl From<AiError> for LoomError {
    fn from(err: AiError) -> Self {
        LoomError::Ai(err.to_string())
    }
}

impl From<ChatError> for LoomError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Store(e) => LoomError::Store(e),
            ChatError::Config(e) => LoomError::Config(e),
            other => LoomError::Ai(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedEngine;

    #[test]
    fn default_prompt_leaves_last_turn_open() {
        let engine = ScriptedEngine::new(Vec::new());
        let prompt = engine.format_prompt(&[
            Message {
                role: Role::System,
                content: "S".into(),
            },
            Message {
                role: Role::Assistant,
                content: "Hel".into(),
            },
        ]);
        assert_eq!(prompt, "<|system|>\nS\n<|end|>\n<|assistant|>\nHel");
    }

    #[test]
    fn usage_total_saturates() {
        let usage = TokenUsage {
            prompt_tokens: u64::MAX,
            generated_tokens: 1,
        };
        assert_eq!(usage.total_tokens(), u64::MAX);
    }

    #[test]
    fn chat_error_maps_store_errors() {
        let err: LoomError = ChatError::Store(StoreError::NotFound("x".into())).into();
        assert!(matches!(err, LoomError::Store(StoreError::NotFound(_))));
        let err: LoomError = ChatError::Ai(AiError::Busy).into();
        assert!(matches!(err, LoomError::Ai(_)));
    }
}
