mod document;
mod navigation;
mod operations;
mod types;

pub use document::{TreeDocument, TurnDocument};
pub use types::*;

/// A tree shared between a session and its in-flight generation.
pub type SharedTree = std::sync::Arc<tokio::sync::Mutex<ConversationTree>>;
