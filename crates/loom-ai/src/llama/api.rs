//! GenerationEngine trait implementation for LlamaServerEngine.

use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tracing::debug;

use super::client::{
    completion_body, llama3_prompt, parse_completion, parse_tokens, strip_special_markers,
    LlamaServerEngine,
};
use crate::{AiError, ChunkOutput, ChunkRequest, GenerationEngine, Message, Token};

#[async_trait]
impl GenerationEngine for LlamaServerEngine {
    async fn generate_chunk(
        &self,
        context: &[Token],
        request: &ChunkRequest,
    ) -> Result<ChunkOutput, AiError> {
        let json = self
            .post("completion", &completion_body(context, request))
            .await?;
        let (tokens, content, end_of_sequence) = parse_completion(&json)?;

        // Older servers only return text; re-tokenize it so the caller can
        // extend its context.
        let tokens = match tokens {
            Some(tokens) => tokens,
            None if content.is_empty() => Vec::new(),
            None => self.encode(&content).await?,
        };
        debug!(
            requested = request.max_new_tokens,
            produced = tokens.len(),
            end_of_sequence,
            "completion chunk"
        );

        Ok(ChunkOutput {
            tokens,
            end_of_sequence,
        })
    }

    async fn encode(&self, text: &str) -> Result<Vec<Token>, AiError> {
        let json = self
            .post(
                "tokenize",
                &serde_json::json!({ "content": text, "add_special": false }),
            )
            .await?;
        parse_tokens(&json)
    }

    /// `/detokenize` renders special tokens as their marker text, so
    /// `skip_special` strips those markers here.
    async fn decode(&self, tokens: &[Token], skip_special: bool) -> Result<String, AiError> {
        if tokens.is_empty() {
            return Ok(String::new());
        }
        let json = self
            .post("detokenize", &serde_json::json!({ "tokens": tokens }))
            .await?;
        let content = json["content"]
            .as_str()
            .ok_or_else(|| AiError::ParseError("detokenize response has no content".into()))?;
        Ok(if skip_special {
            strip_special_markers(content)
        } else {
            content.to_string()
        })
    }

    fn context_window(&self) -> usize {
        self.context_window.load(Ordering::Relaxed)
    }

    fn format_prompt(&self, messages: &[Message]) -> String {
        llama3_prompt(messages)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::super::client::{parse_context_window, parse_tokens};
    use super::*;
    use crate::llama::LlamaServerConfig;
    use crate::Role;

    /// Answer a single HTTP request with `status` and `body`; the task
    /// yields the raw request it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                    let length = head
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{addr}"), task)
    }

    fn engine(base_url: &str) -> LlamaServerEngine {
        LlamaServerEngine::new(LlamaServerConfig::new(base_url)).unwrap()
    }

    #[test]
    fn llama3_prompt_leaves_target_open() {
        let prompt = llama3_prompt(&[
            Message {
                role: Role::System,
                content: "S".into(),
            },
            Message {
                role: Role::User,
                content: "Hi".into(),
            },
            Message {
                role: Role::Assistant,
                content: String::new(),
            },
        ]);
        assert_eq!(
            prompt,
            "<|begin_of_text|>\
             <|start_header_id|>system<|end_header_id|>\n\nS<|eot_id|>\
             <|start_header_id|>user<|end_header_id|>\n\nHi<|eot_id|>\
             <|start_header_id|>assistant<|end_header_id|>\n\n"
        );
    }

    #[test]
    fn completion_body_carries_sampling() {
        let body = completion_body(
            &[1, 2, 3],
            &ChunkRequest {
                max_new_tokens: 20,
                temperature: 0.5,
                top_p: 0.9,
            },
        );
        assert_eq!(body["prompt"], serde_json::json!([1, 2, 3]));
        assert_eq!(body["n_predict"], 20);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["top_p"], 0.9);
    }

    #[test]
    fn completion_parses_eos_and_tokens() {
        let json = serde_json::json!({
            "content": " there",
            "tokens": [1044, 128009],
            "stop": true,
            "stop_type": "eos"
        });
        let (tokens, content, eos) = parse_completion(&json).unwrap();
        assert_eq!(tokens, Some(vec![1044, 128009]));
        assert_eq!(content, " there");
        assert!(eos);

        let limit = serde_json::json!({ "content": "x", "stop": true, "stop_type": "limit" });
        let (tokens, _, eos) = parse_completion(&limit).unwrap();
        assert!(tokens.is_none());
        assert!(!eos);

        let legacy = serde_json::json!({ "content": "", "stopped_eos": true });
        assert!(parse_completion(&legacy).unwrap().2);
    }

    #[test]
    fn completion_without_content_is_parse_error() {
        let err = parse_completion(&serde_json::json!({ "tokens": [] })).unwrap_err();
        assert!(matches!(err, AiError::ParseError(_)));
    }

    #[test]
    fn tokens_parse_plain_and_with_pieces() {
        let plain = serde_json::json!({ "tokens": [9906, 0] });
        assert_eq!(parse_tokens(&plain).unwrap(), vec![9906, 0]);
        let pieces = serde_json::json!({ "tokens": [{ "id": 9906, "piece": "Hello" }] });
        assert_eq!(parse_tokens(&pieces).unwrap(), vec![9906]);
    }

    #[test]
    fn context_window_from_props() {
        let props = serde_json::json!({ "default_generation_settings": { "n_ctx": 4096 } });
        assert_eq!(parse_context_window(&props).unwrap(), 4096);
        assert!(parse_context_window(&serde_json::json!({})).is_err());
    }

    #[tokio::test]
    async fn encode_posts_to_tokenize() {
        let (url, server) = serve_once("200 OK", r#"{"tokens":[9906,1917]}"#).await;
        let tokens = engine(&url).encode("Hello world").await.unwrap();
        assert_eq!(tokens, vec![9906, 1917]);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /tokenize"));
        assert!(request.contains(r#""content":"Hello world""#));
    }

    #[tokio::test]
    async fn generate_chunk_reads_completion() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"content":"Hi","tokens":[13347],"stop":false,"stop_type":"limit"}"#,
        )
        .await;
        let output = engine(&url)
            .generate_chunk(
                &[1, 2],
                &ChunkRequest {
                    max_new_tokens: 1,
                    temperature: 0.7,
                    top_p: 0.9,
                },
            )
            .await
            .unwrap();
        assert_eq!(output.tokens, vec![13347]);
        assert!(!output.end_of_sequence);
        assert!(server.await.unwrap().starts_with("POST /completion"));
    }

    #[tokio::test]
    async fn server_error_is_api_error() {
        let (url, _server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let err = engine(&url).decode(&[1], true).await.unwrap_err();
        assert!(matches!(err, AiError::ApiError(ref msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn connect_reads_context_size() {
        let (url, _server) =
            serve_once("200 OK", r#"{"default_generation_settings":{"n_ctx":2048}}"#).await;
        let engine = LlamaServerEngine::connect(LlamaServerConfig::new(url))
            .await
            .unwrap();
        assert_eq!(engine.context_window(), 2048);
    }

    #[tokio::test]
    async fn connect_falls_back_when_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let config = LlamaServerConfig::new(format!("http://{addr}")).with_context_window(1234);
        let engine = LlamaServerEngine::connect(config).await.unwrap();
        assert_eq!(engine.context_window(), 1234);
    }

    #[test]
    fn special_markers_are_stripped() {
        assert_eq!(
            strip_special_markers("<|start_header_id|>assistant<|end_header_id|>Hi<|eot_id|>"),
            "assistantHi"
        );
        assert_eq!(strip_special_markers("a | b <not|marker>"), "a | b <not|marker>");
    }

    #[tokio::test]
    async fn decode_skips_special_markers_on_request() {
        let body = r#"{"content":"Hi there<|eot_id|>"}"#;
        let (url, server) = serve_once("200 OK", body).await;
        let text = engine(&url).decode(&[13347, 128009], true).await.unwrap();
        assert_eq!(text, "Hi there");
        assert!(server.await.unwrap().starts_with("POST /detokenize"));

        let (url, _server) = serve_once("200 OK", body).await;
        let text = engine(&url).decode(&[13347, 128009], false).await.unwrap();
        assert_eq!(text, "Hi there<|eot_id|>");
    }

    #[tokio::test]
    async fn decode_of_nothing_skips_request() {
        let text = engine("http://127.0.0.1:9").decode(&[], true).await.unwrap();
        assert!(text.is_empty());
    }
}
