//! Chat sessions.
//!
//! A [`ChatSession`] binds one active conversation tree to a store and an
//! engine, and runs at most one generation at a time. Sessions belong to
//! connected clients through the [`SessionRegistry`].

mod chat;
mod manager;
mod registry;
mod store;
mod types;

pub use chat::{ChatSession, ChatStream};
pub use manager::ChatSessionManager;
pub use registry::{SessionRegistry, SharedSession};
pub use store::{FileTreeStore, MemoryTreeStore, TreeStore};
