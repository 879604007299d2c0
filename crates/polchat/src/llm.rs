//! Chat-completion collaborator.
//!
//! The engine treats the model as unreliable: everything it returns goes
//! through the action/sentiment validators. This module only owns the wire
//! contract and error mapping. The `LlmClient` trait is the seam that lets
//! orchestrators run against a scripted fake in tests.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{EngineError, Result};
use crate::types::ChatMessage;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send role-tagged messages, returning the assistant's text reply.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;
}

pub struct HttpLlmClient {
    config: LlmConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Configuration(format!("HTTP client build failed: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        // Missing credentials are a configuration problem the user must fix,
        // not something a retry loop should chew on.
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            EngineError::Configuration(
                "no language model API key configured; set llm.api_key".to_string(),
            )
        })?;

        let request = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": false,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::transport(format!(
                        "request to {} timed out",
                        self.config.endpoint
                    ))
                } else if e.is_connect() {
                    EngineError::transport(format!(
                        "failed to connect to {}: {}",
                        self.config.endpoint, e
                    ))
                } else {
                    EngineError::transport(format!(
                        "request to {} failed: {}",
                        self.config.endpoint, e
                    ))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            EngineError::transport(format!("failed to read model response body: {}", e))
        })?;

        if !status.is_success() {
            let preview: String = body.chars().take(200).collect();
            return Err(EngineError::transport_with_status(
                format!("model endpoint returned HTTP {}: {}", status, preview),
                status.as_u16(),
            ));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            EngineError::Parse(format!(
                "model response was not valid chat-completion JSON: {}. Body: {}",
                e, preview
            ))
        })?;

        parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| EngineError::Parse("model response contained no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[tokio::test]
    async fn missing_api_key_is_a_configuration_error() {
        let config = LlmConfig {
            api_key: None,
            ..LlmConfig::default()
        };
        let client = HttpLlmClient::new(config).expect("client builds");
        let err = client
            .chat(&[ChatMessage::user("hello")])
            .await
            .expect_err("must fail without a key");
        assert_eq!(err.code(), "configuration_error");
        assert!(!err.is_retryable());
    }

    #[test]
    fn completion_response_shape() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "hi there"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).expect("parses");
        assert_eq!(parsed.choices[0].message.content, "hi there");
    }

    #[test]
    fn messages_serialize_with_lowercase_roles() {
        let message = ChatMessage::system("contract");
        let value = serde_json::to_value(&message).expect("serializes");
        assert_eq!(value["role"], "system");
        assert_eq!(message.role, Role::System);
    }
}
