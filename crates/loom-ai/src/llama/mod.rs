//! llama.cpp server adapter.
//!
//! Implements [`GenerationEngine`](crate::GenerationEngine) over the HTTP
//! API of a running `llama-server`: `/tokenize`, `/detokenize`,
//! `/completion` and `/props`. Model weights and sampling stay on the
//! server; this module only moves token ids back and forth.

mod api;
mod client;
mod config;

pub use client::LlamaServerEngine;
pub use config::LlamaServerConfig;
