//! llama.cpp server client configuration.

use std::time::Duration;

use loom_config::LoomConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct LlamaServerConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Context window assumed when the server does not report one.
    pub context_window: usize,
}

impl LlamaServerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(120),
            context_window: 8192,
        }
    }

    pub fn from_config(config: &LoomConfig) -> Self {
        Self::new(config.engine.base_url.clone())
            .with_timeout(Duration::from_secs(u64::from(config.engine.timeout_secs)))
            .with_context_window(config.model.max_context_length as usize)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }

    /// Whether the server lives on this machine.
    pub fn is_local(&self) -> bool {
        reqwest::Url::parse(&self.base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
            .is_some_and(|host| matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]" | "::1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_uses_engine_and_model_sections() {
        let mut config = LoomConfig::default();
        config.engine.base_url = "http://gpu-box:9000".into();
        config.engine.timeout_secs = 30;
        config.model.max_context_length = 4096;

        let llama = LlamaServerConfig::from_config(&config);
        assert_eq!(llama.base_url, "http://gpu-box:9000");
        assert_eq!(llama.timeout, Duration::from_secs(30));
        assert_eq!(llama.context_window, 4096);
        assert!(!llama.is_local());
    }

    #[test]
    fn loopback_is_local() {
        assert!(LlamaServerConfig::new("http://127.0.0.1:8080").is_local());
        assert!(LlamaServerConfig::new("http://localhost:8080/").is_local());
        assert!(!LlamaServerConfig::new("not a url").is_local());
    }
}
