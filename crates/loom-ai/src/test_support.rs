//! Scripted engine for coordinator and session tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::{AiError, ChunkOutput, ChunkRequest, GenerationEngine, Token};

pub(crate) const EOS: Token = 2;
const SCRIPTED_BASE: Token = 10_000;

#[derive(Debug, Clone)]
pub(crate) enum Step {
    Chunk(&'static str, bool),
    Fail,
}

/// Replays a fixed list of chunks. Plain text encodes to one token per
/// character; each scripted chunk decodes from a single synthetic token.
/// Once the script runs out every call returns an empty chunk.
pub(crate) struct ScriptedEngine {
    steps: Mutex<VecDeque<Step>>,
    vocab: Mutex<Vec<String>>,
    requests: Mutex<Vec<ChunkRequest>>,
    contexts: Mutex<Vec<Vec<Token>>>,
    encoded: Mutex<Vec<String>>,
    window: usize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedEngine {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            vocab: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
            encoded: Mutex::new(Vec::new()),
            window: 1_000_000,
            gate: None,
        }
    }

    pub(crate) fn chunks(chunks: &[(&'static str, bool)]) -> Self {
        Self::new(chunks.iter().map(|&(text, eos)| Step::Chunk(text, eos)).collect())
    }

    pub(crate) fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Every chunk call waits for a permit from `gate`.
    pub(crate) fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn requested_sizes(&self) -> Vec<usize> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.max_new_tokens)
            .collect()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn contexts(&self) -> Vec<Vec<Token>> {
        self.contexts.lock().unwrap().clone()
    }

    pub(crate) fn encoded_texts(&self) -> Vec<String> {
        self.encoded.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationEngine for ScriptedEngine {
    async fn generate_chunk(
        &self,
        context: &[Token],
        request: &ChunkRequest,
    ) -> Result<ChunkOutput, AiError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| AiError::ApiError("gate closed".into()))?
                .forget();
        }

        self.requests.lock().unwrap().push(*request);
        self.contexts.lock().unwrap().push(context.to_vec());

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => Ok(ChunkOutput::default()),
            Some(Step::Fail) => Err(AiError::ApiError("scripted failure".into())),
            Some(Step::Chunk(text, end_of_sequence)) => {
                let mut vocab = self.vocab.lock().unwrap();
                let mut tokens = vec![SCRIPTED_BASE + vocab.len() as Token];
                vocab.push(text.to_string());
                if end_of_sequence {
                    tokens.push(EOS);
                }
                Ok(ChunkOutput {
                    tokens,
                    end_of_sequence,
                })
            }
        }
    }

    async fn encode(&self, text: &str) -> Result<Vec<Token>, AiError> {
        self.encoded.lock().unwrap().push(text.to_string());
        Ok(text.chars().map(|c| c as Token).collect())
    }

    async fn decode(&self, tokens: &[Token], skip_special: bool) -> Result<String, AiError> {
        let vocab = self.vocab.lock().unwrap();
        let mut out = String::new();
        for &token in tokens {
            if token == EOS {
                if !skip_special {
                    out.push_str("</s>");
                }
            } else if token >= SCRIPTED_BASE {
                let index = (token - SCRIPTED_BASE) as usize;
                out.push_str(&vocab[index]);
            } else if let Some(c) = char::from_u32(token) {
                out.push(c);
            }
        }
        Ok(out)
    }

    fn context_window(&self) -> usize {
        self.window
    }
}
