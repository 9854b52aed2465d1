//! Per-connection sessions keyed by [`SessionId`].

use std::collections::HashMap;
use std::sync::Arc;

use loom_common::SessionId;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use super::chat::ChatSession;

pub type SharedSession = Arc<Mutex<ChatSession>>;

type SessionFactory = Box<dyn Fn() -> ChatSession + Send + Sync>;

/// Maps connected clients to their chat sessions, creating one on first use.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SharedSession>>,
    factory: SessionFactory,
}

impl SessionRegistry {
    pub fn new(factory: impl Fn() -> ChatSession + Send + Sync + 'static) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    pub async fn get_or_create(&self, id: &SessionId) -> SharedSession {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(id.clone()).or_insert_with(|| {
            info!(session = %id, "session created");
            Arc::new(Mutex::new((self.factory)()))
        });
        Arc::clone(session)
    }

    pub async fn get(&self, id: &SessionId) -> Option<SharedSession> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Forget a disconnected client's session.
    pub async fn remove(&self, id: &SessionId) -> Option<SharedSession> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            info!(session = %id, "session removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
