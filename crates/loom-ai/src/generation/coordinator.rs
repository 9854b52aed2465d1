//! Chunked generation as an explicit state machine.
//!
//! A [`Generation`] is prepared against one target turn, then driven by
//! repeated [`Generation::next_chunk`] calls. Each call asks the engine for
//! at most `chunk_size` tokens, appends the decoded text to the target and
//! returns a history snapshot. The tree lock is held only while reading the
//! path and while committing a chunk, never across an engine call.

use std::sync::Arc;

use futures_util::stream::{self, Stream};
use loom_common::HistoryEntry;
use loom_config::ModelConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::truncation::TruncationPolicy;
use crate::tree::{NodeId, SharedTree};
use crate::{AiError, ChunkOutput, ChunkRequest, GenerationEngine, Message, Token, TokenUsage};

/// Label some chat templates make the model echo at the start of a reply.
const ROLE_ARTIFACT: &str = "assistant";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Total new-token budget.
    pub generation_length: usize,
    /// Tokens requested per engine call.
    pub chunk_size: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub max_context_length: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for GenerationParams {
    fn from(model: &ModelConfig) -> Self {
        Self {
            generation_length: model.generation_length as usize,
            chunk_size: model.chunk_size as usize,
            temperature: model.temperature,
            top_p: model.top_p,
            max_context_length: model.max_context_length as usize,
        }
    }
}

impl GenerationParams {
    pub fn validate(&self) -> Result<(), AiError> {
        if self.generation_length == 0 {
            return Err(AiError::InvalidParams("generation_length must be positive".into()));
        }
        if self.chunk_size == 0 {
            return Err(AiError::InvalidParams("chunk_size must be positive".into()));
        }
        if self.max_context_length == 0 {
            return Err(AiError::InvalidParams("max_context_length must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AiError::InvalidParams(format!(
                "temperature {} outside 0.0-2.0",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(AiError::InvalidParams(format!("top_p {} outside 0.0-1.0", self.top_p)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The engine produced an end-of-sequence token.
    EndOfSequence,
    /// The token budget was spent.
    BudgetExhausted,
    /// The cancellation token fired.
    Cancelled,
    /// The engine returned no tokens and no end-of-sequence.
    EngineExhausted,
    /// An engine or commit error ended the loop.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationReport {
    pub stop: StopReason,
    pub chunks: usize,
    pub usage: TokenUsage,
}

pub struct Generation {
    engine: Arc<dyn GenerationEngine>,
    tree: SharedTree,
    tree_id: String,
    target: NodeId,
    params: GenerationParams,
    context: Vec<Token>,
    remaining: usize,
    strip_artifact: bool,
    chunks: usize,
    usage: TokenUsage,
    stop: Option<StopReason>,
    cancel: CancellationToken,
}

impl Generation {
    /// Read the path to `target`, build the (possibly truncated) prompt and
    /// encode it. Role-artifact stripping applies only when the target
    /// starts empty; continuing a partial reply keeps the text verbatim.
    pub async fn prepare(
        engine: Arc<dyn GenerationEngine>,
        tree: SharedTree,
        target: NodeId,
        params: GenerationParams,
        policy: TruncationPolicy,
        cancel: CancellationToken,
    ) -> Result<Self, AiError> {
        params.validate()?;

        let (tree_id, messages, strip_artifact) = {
            let guard = tree.lock().await;
            let turn = guard.node(target).ok_or(AiError::TargetMissing)?;
            (
                guard.id().to_string(),
                guard.messages_to(target),
                turn.content().is_empty(),
            )
        };

        let window = match engine.context_window() {
            0 => params.max_context_length,
            w => w.min(params.max_context_length),
        };
        // Prompt and reply share the window. The reply's share is capped at
        // half so a large budget cannot starve the prompt.
        let reserve = params.generation_length.min(window / 2);
        let context = build_context(engine.as_ref(), &messages, policy, window - reserve).await?;
        let budget = params
            .generation_length
            .min(window.saturating_sub(context.len()));

        info!(
            tree = %tree_id,
            prompt_tokens = context.len(),
            window,
            budget,
            "generation prepared"
        );

        Ok(Self {
            engine,
            tree,
            tree_id,
            target,
            params,
            usage: TokenUsage {
                prompt_tokens: context.len() as u64,
                generated_tokens: 0,
            },
            context,
            remaining: budget,
            strip_artifact,
            chunks: 0,
            stop: None,
            cancel,
        })
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn is_finished(&self) -> bool {
        self.stop.is_some()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Summary of the run so far. An unfinished run reports `Cancelled`.
    pub fn report(&self) -> GenerationReport {
        GenerationReport {
            stop: self.stop.unwrap_or(StopReason::Cancelled),
            chunks: self.chunks,
            usage: self.usage,
        }
    }

    /// Request, decode and commit one chunk.
    ///
    /// Returns the history after the commit, or `None` once the run has
    /// stopped. Engine errors end the run and propagate; text committed by
    /// earlier chunks stays in the tree.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<HistoryEntry>>, AiError> {
        if self.stop.is_some() {
            return Ok(None);
        }
        if self.remaining == 0 {
            self.finish(StopReason::BudgetExhausted);
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            self.finish(StopReason::Cancelled);
            return Ok(None);
        }

        let request = ChunkRequest {
            max_new_tokens: self.params.chunk_size.min(self.remaining),
            temperature: self.params.temperature,
            top_p: self.params.top_p,
        };

        let engine = Arc::clone(&self.engine);
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = engine.generate_chunk(&self.context, &request) => Some(result),
        };
        let Some(result) = result else {
            self.finish(StopReason::Cancelled);
            return Ok(None);
        };

        match self.absorb(request, result).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                warn!(tree = %self.tree_id, chunk = self.chunks, error = %err, "generation failed");
                self.stop = Some(StopReason::Failed);
                Err(err)
            }
        }
    }

    /// Drive the run as a lazy stream of snapshots. The stream ends after
    /// the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<HistoryEntry>, AiError>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut generation = state?;
            match generation.next_chunk().await {
                Ok(Some(snapshot)) => Some((Ok(snapshot), Some(generation))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    async fn absorb(
        &mut self,
        request: ChunkRequest,
        result: Result<ChunkOutput, AiError>,
    ) -> Result<Vec<HistoryEntry>, AiError> {
        let output = result?;
        self.remaining = self.remaining.saturating_sub(request.max_new_tokens);
        self.chunks += 1;
        self.usage.generated_tokens += output.tokens.len() as u64;

        // Only the new tokens are decoded; re-decoding the whole context
        // would repeat earlier text.
        let decoded = self.engine.decode(&output.tokens, true).await?;
        let text = if std::mem::take(&mut self.strip_artifact) {
            strip_role_artifact(&decoded)
        } else {
            decoded.as_str()
        };
        self.context.extend_from_slice(&output.tokens);

        let snapshot = self.commit(text).await?;
        debug!(
            tree = %self.tree_id,
            chunk = self.chunks,
            tokens = output.tokens.len(),
            remaining = self.remaining,
            "chunk committed"
        );

        if output.end_of_sequence {
            self.finish(StopReason::EndOfSequence);
        } else if output.tokens.is_empty() {
            self.finish(StopReason::EngineExhausted);
        } else if self.remaining == 0 {
            self.finish(StopReason::BudgetExhausted);
        }
        Ok(snapshot)
    }

    async fn commit(&self, text: &str) -> Result<Vec<HistoryEntry>, AiError> {
        let mut tree = self.tree.lock().await;
        if tree.id() != self.tree_id || tree.node(self.target).is_none() {
            return Err(AiError::TargetMissing);
        }
        if !text.is_empty() {
            tree.append_content(self.target, text);
        }
        Ok(tree.history())
    }

    fn finish(&mut self, reason: StopReason) {
        if self.stop.is_none() {
            info!(
                tree = %self.tree_id,
                reason = ?reason,
                chunks = self.chunks,
                generated_tokens = self.usage.generated_tokens,
                "generation finished"
            );
            self.stop = Some(reason);
        }
    }
}

/// Encode the full path; if it overflows `limit`, apply the truncation
/// policy and encode again. A prompt still too long after truncation keeps
/// only its trailing `limit` tokens.
async fn build_context(
    engine: &dyn GenerationEngine,
    messages: &[Message],
    policy: TruncationPolicy,
    limit: usize,
) -> Result<Vec<Token>, AiError> {
    let tokens = engine.encode(&engine.format_prompt(messages)).await?;
    if tokens.len() <= limit {
        return Ok(tokens);
    }

    let kept = policy.apply(messages);
    warn!(
        prompt_tokens = tokens.len(),
        limit,
        dropped_turns = messages.len() - kept.len(),
        "prompt exceeds its share of the context window, truncating"
    );
    let mut tokens = engine.encode(&engine.format_prompt(&kept)).await?;
    if tokens.len() > limit {
        warn!(
            prompt_tokens = tokens.len(),
            limit, "truncated prompt still too long, keeping the most recent tokens"
        );
        tokens.drain(..tokens.len() - limit);
    }
    Ok(tokens)
}

fn strip_role_artifact(text: &str) -> &str {
    let trimmed = text.trim_start();
    trimmed
        .strip_prefix(ROLE_ARTIFACT)
        .unwrap_or(trimmed)
        .trim_start()
}
