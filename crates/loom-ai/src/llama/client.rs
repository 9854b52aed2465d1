//! llama.cpp server client struct, request building, and response parsing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use super::config::LlamaServerConfig;
use crate::{AiError, ChunkRequest, Message, Token};

/// Generation engine backed by a `llama-server` process.
pub struct LlamaServerEngine {
    pub(crate) config: LlamaServerConfig,
    pub(crate) http: reqwest::Client,
    pub(crate) context_window: AtomicUsize,
}

impl LlamaServerEngine {
    pub fn new(config: LlamaServerConfig) -> Result<Self, AiError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.timeout);
        if config.is_local() {
            builder = builder.no_proxy();
        }
        let http = builder
            .build()
            .map_err(|e| AiError::NetworkError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            context_window: AtomicUsize::new(config.context_window),
            config,
            http,
        })
    }

    /// Build the client and ask the server for its context size. An
    /// unreachable `/props` keeps the configured window.
    pub async fn connect(config: LlamaServerConfig) -> Result<Self, AiError> {
        let engine = Self::new(config)?;
        match engine.fetch_context_window().await {
            Ok(n_ctx) => {
                info!(url = %engine.config.base_url, n_ctx, "connected to llama server");
                engine.context_window.store(n_ctx, Ordering::Relaxed);
            }
            Err(e) => warn!(
                url = %engine.config.base_url,
                error = %e,
                fallback = engine.config.context_window,
                "could not read server context size"
            ),
        }
        Ok(engine)
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn fetch_context_window(&self) -> Result<usize, AiError> {
        let response = self
            .http
            .get(self.url("props"))
            .send()
            .await
            .map_err(|e| AiError::NetworkError(e.to_string()))?;
        let json = Self::read_json(response).await?;
        parse_context_window(&json)
    }

    pub(crate) async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, AiError> {
        debug!(path, "llama server request");
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout
                } else {
                    AiError::NetworkError(e.to_string())
                }
            })?;
        Self::read_json(response).await
    }

    async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, AiError> {
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        {
            return Err(AiError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = text.chars().take(200).collect::<String>();
            return Err(AiError::ApiError(format!("HTTP {status}: {text}")));
        }
        response
            .json()
            .await
            .map_err(|e| AiError::ParseError(e.to_string()))
    }
}

/// Llama 3 instruct template. The last message gets a header but no
/// end-of-turn marker, so the model writes into it.
pub(crate) fn llama3_prompt(messages: &[Message]) -> String {
    let mut prompt = String::from("<|begin_of_text|>");
    let last = messages.len().saturating_sub(1);
    for (i, message) in messages.iter().enumerate() {
        prompt.push_str("<|start_header_id|>");
        prompt.push_str(message.role.as_str());
        prompt.push_str("<|end_header_id|>\n\n");
        prompt.push_str(&message.content);
        if i != last {
            prompt.push_str("<|eot_id|>");
        }
    }
    prompt
}

pub(crate) fn completion_body(context: &[Token], request: &ChunkRequest) -> serde_json::Value {
    serde_json::json!({
        "prompt": context,
        "n_predict": request.max_new_tokens,
        "temperature": request.temperature,
        "top_p": request.top_p,
        "cache_prompt": true,
        "return_tokens": true,
    })
}

/// Parse a `/completion` response. `tokens` is `None` when the server did
/// not return token ids.
pub(crate) fn parse_completion(
    json: &serde_json::Value,
) -> Result<(Option<Vec<Token>>, String, bool), AiError> {
    let content = json["content"]
        .as_str()
        .ok_or_else(|| AiError::ParseError("completion response has no content".into()))?
        .to_string();

    let tokens = json["tokens"].as_array().map(|ids| {
        ids.iter()
            .filter_map(|id| id.as_u64())
            .map(|id| id as Token)
            .collect::<Vec<_>>()
    });

    let end_of_sequence = match json["stop_type"].as_str() {
        Some(stop_type) => stop_type == "eos",
        None => json["stopped_eos"].as_bool().unwrap_or(false),
    };

    Ok((tokens, content, end_of_sequence))
}

pub(crate) fn parse_tokens(json: &serde_json::Value) -> Result<Vec<Token>, AiError> {
    json["tokens"]
        .as_array()
        .ok_or_else(|| AiError::ParseError("tokenize response has no tokens".into()))?
        .iter()
        .map(|id| {
            // With pieces enabled each entry is an object carrying the id.
            id.as_u64()
                .or_else(|| id["id"].as_u64())
                .map(|id| id as Token)
                .ok_or_else(|| AiError::ParseError(format!("bad token id: {id}")))
        })
        .collect()
}

/// Llama 3 control markers such as `<|eot_id|>` or `<|start_header_id|>`.
static SPECIAL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\|[A-Za-z0-9_]+\|>").unwrap());

/// Removes special-token text that `/detokenize` renders verbatim.
pub(crate) fn strip_special_markers(text: &str) -> String {
    SPECIAL_MARKER.replace_all(text, "").into_owned()
}

pub(crate) fn parse_context_window(json: &serde_json::Value) -> Result<usize, AiError> {
    json["default_generation_settings"]["n_ctx"]
        .as_u64()
        .or_else(|| json["n_ctx"].as_u64())
        .filter(|&n| n > 0)
        .map(|n| n as usize)
        .ok_or_else(|| AiError::ParseError("props response has no n_ctx".into()))
}
