//! Engine configuration: collaborator endpoints, timeouts, and retry knobs.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub intent: IntentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Chat-completion endpoint URL.
    pub endpoint: String,
    /// Bearer credential. Absence is a configuration error at call time,
    /// not a retryable failure.
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search backend base URL (the `/search` route hangs off this).
    pub base_url: String,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
    /// Fixed backoff schedule for 5xx/network/timeout failures. The length
    /// of this list is the number of additional attempts.
    #[serde(default = "default_retry_delays_secs")]
    pub retry_delays_secs: Vec<u64>,
    /// Enrich results with metadata from the backend's store.
    #[serde(default = "default_enrich")]
    pub enrich: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Token-overlap share (of the smaller token set) above which a new
    /// prompt is treated as related to the previous search. A coarse
    /// similarity proxy; tunable, not load-bearing.
    #[serde(default = "default_overlap_threshold")]
    pub related_overlap_threshold: f32,
    /// Tokens at or below this length are ignored by the overlap check.
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
}

const fn default_llm_timeout_secs() -> u64 { 30 }
const fn default_max_tokens() -> u32 { 1024 }
const fn default_temperature() -> f32 { 0.2 }
const fn default_search_timeout_secs() -> u64 { 10 }
const fn default_health_timeout_secs() -> u64 { 5 }
fn default_retry_delays_secs() -> Vec<u64> { vec![1, 3, 5] }
const fn default_enrich() -> bool { true }
const fn default_overlap_threshold() -> f32 { 0.3 }
const fn default_min_token_len() -> usize { 3 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: default_llm_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: default_search_timeout_secs(),
            health_timeout_secs: default_health_timeout_secs(),
            retry_delays_secs: default_retry_delays_secs(),
            enrich: default_enrich(),
        }
    }
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            related_overlap_threshold: default_overlap_threshold(),
            min_token_len: default_min_token_len(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            intent: IntentConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate config values, returning errors for clearly broken
    /// configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.llm.endpoint.is_empty() {
            return Err("llm.endpoint must not be empty".into());
        }
        if self.llm.model.is_empty() {
            return Err("llm.model must not be empty".into());
        }
        if self.llm.timeout_secs == 0 {
            return Err("llm.timeout_secs must be > 0".into());
        }
        if self.search.base_url.is_empty() {
            return Err("search.base_url must not be empty".into());
        }
        if self.search.timeout_secs == 0 {
            return Err("search.timeout_secs must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.intent.related_overlap_threshold) {
            return Err("intent.related_overlap_threshold must be in [0.0, 1.0]".into());
        }
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}
