//! Configuration schema for the chatflow engine.

use serde::{Deserialize, Serialize};

/// Root config for a chatflow deployment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatflowConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
}

impl ChatflowConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> ChatflowConfigBuilder {
        ChatflowConfigBuilder::new()
    }

    /// Validate cross-field constraints after load.
    pub fn validate(&self) -> Result<(), crate::ConfigError> {
        if self.keywords.restart.is_empty() {
            return Err(crate::ConfigError::InvalidField {
                path: "keywords.restart".to_string(),
                message: "restart keyword set must not be empty".to_string(),
            });
        }
        if self.keywords.start.is_empty() {
            return Err(crate::ConfigError::InvalidField {
                path: "keywords.start".to_string(),
                message: "start keyword set must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for assembling a `ChatflowConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct ChatflowConfigBuilder {
    config: ChatflowConfig,
}

impl ChatflowConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: ChatflowConfig::default(),
        }
    }

    /// Replace the keyword sets.
    pub fn keywords(mut self, keywords: KeywordsConfig) -> Self {
        self.config.keywords = keywords;
        self
    }

    /// Replace the session registry options.
    pub fn sessions(mut self, sessions: SessionsConfig) -> Self {
        self.config.sessions = sessions;
        self
    }

    /// Replace the message log options.
    pub fn messages(mut self, messages: MessagesConfig) -> Self {
        self.config.messages = messages;
        self
    }

    /// Finalize and return the built `ChatflowConfig`.
    pub fn build(self) -> ChatflowConfig {
        self.config
    }
}

/// Keyword sets used by matching and resolution.
///
/// Defaults carry the English set plus the Vietnamese variants the product
/// ships with; operators can replace them wholesale per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordsConfig {
    /// Greeting keywords that match a graph's start node.
    #[serde(default = "default_start_keywords")]
    pub start: Vec<String>,
    /// Keywords that jump the conversation back to the start node.
    #[serde(default = "default_restart_keywords")]
    pub restart: Vec<String>,
    /// Keywords that match receipt nodes.
    #[serde(default = "default_receipt_keywords")]
    pub receipt: Vec<String>,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            start: default_start_keywords(),
            restart: default_restart_keywords(),
            receipt: default_receipt_keywords(),
        }
    }
}

fn default_start_keywords() -> Vec<String> {
    [
        "start",
        "bắt đầu",
        "khởi động",
        "chào",
        "hello",
        "hi",
        "xin chào",
        "menu chính",
        "trang chủ",
    ]
    .map(str::to_string)
    .to_vec()
}

fn default_restart_keywords() -> Vec<String> {
    [
        "start",
        "bắt đầu",
        "khởi động",
        "reset",
        "restart",
        "về đầu",
        "quay lại",
    ]
    .map(str::to_string)
    .to_vec()
}

fn default_receipt_keywords() -> Vec<String> {
    [
        "receipt",
        "bill",
        "order",
        "payment",
        "invoice",
        "hóa đơn",
        "đơn hàng",
        "thanh toán",
    ]
    .map(str::to_string)
    .to_vec()
}

/// Session registry options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionsConfig {
    /// Evict in-memory instances idle for longer than this many seconds when
    /// the host runs an eviction sweep. `None` disables idle eviction.
    #[serde(default)]
    pub idle_ttl_secs: Option<u64>,
}

/// Message log options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessagesConfig {
    /// Directory for the JSONL message log, when the host uses it.
    #[serde(default)]
    pub path: Option<String>,
}
