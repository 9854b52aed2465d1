//! Session-level chat commands: every command that starts a generation,
//! plus pass-throughs to the manager guarded against running generations.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use loom_common::{new_correlation_id, ChatEvent, ChatSummary, EventBus, HistoryEntry, Role, UpdateTag};
use loom_config::{LoomConfig, ModelConfig, ModelConfigChange, ModelConfigUpdate};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use super::manager::ChatSessionManager;
use super::store::TreeStore;
use super::types::{ensure_idle, BusyGuard};
use crate::generation::{
    spawn_generation, Generation, GenerationHandle, GenerationParams, GenerationReport,
    TruncationPolicy, SNAPSHOT_BUFFER,
};
use crate::token_tracker::TokenTracker;
use crate::tree::{NodeId, Outcome, SharedTree};
use crate::{ChatError, GenerationEngine, TokenUsage};

/// One client's conversation: the active tree, the engine it talks to and
/// the live model settings.
pub struct ChatSession {
    manager: ChatSessionManager,
    engine: Arc<dyn GenerationEngine>,
    model: ModelConfig,
    policy: TruncationPolicy,
    busy: Arc<AtomicBool>,
    tracker: Arc<Mutex<TokenTracker>>,
    events: Option<Arc<EventBus>>,
}

impl ChatSession {
    pub fn new(
        engine: Arc<dyn GenerationEngine>,
        store: Arc<dyn TreeStore>,
        config: &LoomConfig,
    ) -> Self {
        Self {
            manager: ChatSessionManager::new(store, &config.context),
            engine,
            model: config.model.clone(),
            policy: TruncationPolicy::from(&config.context),
            busy: Arc::new(AtomicBool::new(false)),
            tracker: Arc::new(Mutex::new(TokenTracker::new())),
            events: None,
        }
    }

    /// Publish [`ChatEvent`]s for every command on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn manager(&self) -> &ChatSessionManager {
        &self.manager
    }

    pub fn settings(&self) -> &ModelConfig {
        &self.model
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn usage(&self) -> TokenUsage {
        *self.tracker.lock().await.total()
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.manager.history().await
    }

    /// Append a user turn and stream a reply to it.
    pub async fn send_message(&self, text: &str) -> Result<ChatStream, ChatError> {
        let guard = BusyGuard::acquire(&self.busy)?;
        let target = {
            let shared = self.manager.tree();
            let mut tree = shared.lock().await;
            tree.append(Role::User, text);
            tree.append(Role::Assistant, "")
        };
        self.start(guard, target).await
    }

    /// Branch the user turn `distance` steps up with `text`, then stream a
    /// reply under the new branch.
    pub async fn edit(&self, distance: usize, text: &str) -> Result<ChatStream, ChatError> {
        let guard = BusyGuard::acquire(&self.busy)?;
        let target = {
            let shared = self.manager.tree();
            let mut tree = shared.lock().await;
            tree.edit(distance, text).into_result()?;
            tree.append(Role::Assistant, "")
        };
        self.start(guard, target).await
    }

    /// Branch the assistant turn `distance` steps up and stream a new reply.
    pub async fn regenerate(&self, distance: usize) -> Result<ChatStream, ChatError> {
        let guard = BusyGuard::acquire(&self.busy)?;
        let target = {
            let shared = self.manager.tree();
            let mut tree = shared.lock().await;
            tree.regenerate(distance).into_result()?;
            tree.current()
        };
        self.start(guard, target).await
    }

    /// Keep writing the current assistant turn, or start one if the current
    /// turn belongs to someone else.
    pub async fn continue_generation(&self) -> Result<ChatStream, ChatError> {
        let guard = BusyGuard::acquire(&self.busy)?;
        let target = {
            let shared = self.manager.tree();
            let mut tree = shared.lock().await;
            if tree.current_turn().role() == Role::Assistant {
                tree.current()
            } else {
                tree.append(Role::Assistant, "")
            }
        };
        self.start(guard, target).await
    }

    /// Switch branches. Rejections come back inside the [`Outcome`].
    pub async fn navigate(&self, distance: usize, direction: &str) -> Result<Outcome, ChatError> {
        ensure_idle(&self.busy)?;
        let outcome = self.manager.tree().lock().await.navigate(distance, direction);
        if outcome.is_applied() {
            self.publish(ChatEvent::ChatUpdate {
                history: outcome.history.clone(),
                tag: Some(UpdateTag::Navigation),
            });
        }
        Ok(outcome)
    }

    pub async fn save(&self) -> Result<String, ChatError> {
        let location = self.manager.save().await?;
        self.publish(ChatEvent::ChatSaved {
            id: self.manager.active_id().await,
            location: location.clone(),
        });
        Ok(location)
    }

    pub async fn load(&self, id: &str) -> Result<Vec<HistoryEntry>, ChatError> {
        ensure_idle(&self.busy)?;
        let history = self.manager.load(id).await?;
        self.publish(ChatEvent::ChatHistory(history.clone()));
        Ok(history)
    }

    pub async fn list(&self) -> Result<Vec<ChatSummary>, ChatError> {
        let chats = self.manager.list().await?;
        self.publish(ChatEvent::ChatList(chats.clone()));
        Ok(chats)
    }

    /// Save the current chat (best effort) and start a fresh one.
    pub async fn new_chat(&self) -> Result<String, ChatError> {
        ensure_idle(&self.busy)?;
        let id = self.manager.start_new().await;
        self.publish(ChatEvent::NewChatStarted { id: id.clone() });
        Ok(id)
    }

    /// Discard the current chat without saving.
    pub async fn reset(&self) -> Result<Vec<HistoryEntry>, ChatError> {
        ensure_idle(&self.busy)?;
        let history = self.manager.reset().await;
        self.publish(ChatEvent::ChatHistory(history.clone()));
        Ok(history)
    }

    pub async fn rename(&self, name: &str) -> Result<String, ChatError> {
        Ok(self.manager.rename(name).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ChatError> {
        Ok(self.manager.delete(id).await?)
    }

    /// Validate and apply new model settings. Takes effect from the next
    /// generation; a running one keeps the settings it started with.
    pub fn update_settings(
        &mut self,
        update: &ModelConfigUpdate,
    ) -> Result<ModelConfigChange, ChatError> {
        let change = self.model.apply_update(update)?;
        if change.reload_required {
            info!(model = %self.model.model_name, "model changed, engine reload required");
        }
        Ok(change)
    }

    /// Surface a command failure to event subscribers.
    pub fn report_error(&self, error: &ChatError) {
        self.publish(ChatEvent::Error(error.to_string()));
    }

    fn publish(&self, event: ChatEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    async fn start(&self, guard: BusyGuard, target: NodeId) -> Result<ChatStream, ChatError> {
        let tree = self.manager.tree();
        let tree_id = tree.lock().await.id().to_string();
        let request = new_correlation_id();
        let span = info_span!("generation", %request, chat = %tree_id);

        let generation = Generation::prepare(
            Arc::clone(&self.engine),
            Arc::clone(&tree),
            target,
            GenerationParams::from(&self.model),
            self.policy,
            CancellationToken::new(),
        )
        .instrument(span)
        .await?;

        Ok(ChatStream {
            handle: spawn_generation(generation, SNAPSHOT_BUFFER),
            tree,
            tree_id,
            tracker: Arc::clone(&self.tracker),
            events: self.events.clone(),
            _busy: guard,
        })
    }
}

/// A running generation started by a [`ChatSession`] command.
///
/// The session stays busy until the stream is finished or dropped.
/// Dropping it cancels the generation.
pub struct ChatStream {
    handle: GenerationHandle,
    tree: SharedTree,
    tree_id: String,
    tracker: Arc<Mutex<TokenTracker>>,
    events: Option<Arc<EventBus>>,
    _busy: BusyGuard,
}

impl fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatStream")
            .field("tree_id", &self.tree_id)
            .field("cancelled", &self.handle.cancel_token().is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ChatStream {
    /// Next snapshot, or `None` once generation has stopped.
    pub async fn next(&mut self) -> Option<Vec<HistoryEntry>> {
        let snapshot = self.handle.next().await?;
        if let Some(bus) = &self.events {
            bus.publish(ChatEvent::ChatUpdate {
                history: snapshot.clone(),
                tag: None,
            });
        }
        Some(snapshot)
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.handle.cancel_token()
    }

    /// Drain remaining snapshots, wait for the generation and record its
    /// usage. A successful run ends with a `stop`-tagged update.
    pub async fn finish(mut self) -> Result<GenerationReport, ChatError> {
        while self.next().await.is_some() {}
        let ChatStream {
            handle,
            tree,
            tree_id,
            tracker,
            events,
            _busy,
        } = self;

        match handle.finish().await {
            Ok(report) => {
                tracker.lock().await.record(&tree_id, &report.usage);
                if let Some(bus) = &events {
                    bus.publish(ChatEvent::ChatUpdate {
                        history: tree.lock().await.history(),
                        tag: Some(UpdateTag::Stop),
                    });
                }
                Ok(report)
            }
            Err(err) => {
                if let Some(bus) = &events {
                    bus.publish(ChatEvent::Error(err.to_string()));
                }
                Err(err.into())
            }
        }
    }
}
