//! Binds the active conversation tree to persistent storage.

use std::sync::Arc;

use loom_common::{ChatSummary, HistoryEntry, Role, StoreError};
use loom_config::ContextConfig;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::store::TreeStore;
use crate::tree::{ConversationTree, SharedTree};

/// Owns the active tree and knows how to save, load and enumerate trees.
pub struct ChatSessionManager {
    store: Arc<dyn TreeStore>,
    tree: SharedTree,
    root_role: Role,
    root_prompt: String,
}

impl ChatSessionManager {
    pub fn new(store: Arc<dyn TreeStore>, context: &ContextConfig) -> Self {
        let tree = ConversationTree::new(context.root_role, context.system_prompt.clone());
        Self {
            store,
            tree: Arc::new(Mutex::new(tree)),
            root_role: context.root_role,
            root_prompt: context.system_prompt.clone(),
        }
    }

    /// Shared handle to the active tree.
    pub fn tree(&self) -> SharedTree {
        Arc::clone(&self.tree)
    }

    pub async fn active_id(&self) -> String {
        self.tree.lock().await.id().to_string()
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.tree.lock().await.history()
    }

    /// Persist the active tree. The lock is released before any I/O.
    pub async fn save(&self) -> Result<String, StoreError> {
        let document = self.tree.lock().await.to_document();
        let location = self.store.put(&document).await?;
        info!(id = %document.id, %location, "chat saved");
        Ok(location)
    }

    /// Replace the active tree with a stored one. On failure the active
    /// tree is untouched.
    pub async fn load(&self, id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let document = self.store.get(id).await?;
        let tree = ConversationTree::from_document(&document)?;
        let history = tree.history();
        *self.tree.lock().await = tree;
        info!(%id, "chat loaded");
        Ok(history)
    }

    pub async fn list(&self) -> Result<Vec<ChatSummary>, StoreError> {
        self.store.list().await
    }

    /// Save the active tree (best effort) and replace it with a fresh one.
    pub async fn start_new(&self) -> String {
        if let Err(e) = self.save().await {
            warn!(error = %e, "failed to save chat before starting a new one");
        }
        self.replace_with_fresh().await
    }

    /// Drop the active tree without saving it.
    pub async fn reset(&self) -> Vec<HistoryEntry> {
        self.replace_with_fresh().await;
        self.history().await
    }

    /// Rename the active tree and persist it immediately.
    pub async fn rename(&self, name: &str) -> Result<String, StoreError> {
        self.tree.lock().await.rename(name);
        self.save().await
    }

    /// Delete a stored tree. The in-memory tree is not affected, even when
    /// it is the one deleted.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(id).await?;
        info!(%id, "chat deleted");
        Ok(())
    }

    async fn replace_with_fresh(&self) -> String {
        let tree = ConversationTree::new(self.root_role, self.root_prompt.clone());
        let id = tree.id().to_string();
        *self.tree.lock().await = tree;
        info!(%id, "new chat started");
        id
    }
}
